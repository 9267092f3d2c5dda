//! The session and its scopes (spec §4: "Session lifecycle", Design Notes
//! "explicit capability passed as an argument").
//!
//! [`Session`] owns the transport, the command registry, and the event
//! dispatcher for one browser process. [`Scope`] is the capability callers
//! actually hold: a cancellation token plus a reference to the session (and,
//! once attached to a tab, a [`Target`]). Deriving a child scope — for a
//! worker, a timeout, or a second tab — never requires threading the
//! session through a new parameter, matching the spec's recommended
//! cancellation-propagation strategy over the alternatives it considered
//! (implicit thread-local, or a session-owns-all-cancellation model).
//!
//! Grounded in the teacher's `handler::mod` reader/dispatch loop and
//! `browser.rs` `Browser::close` teardown sequence; the explicit-capability
//! scope type itself has no teacher counterpart (the teacher threads
//! `Arc<Handler>` implicitly via channels) and is this crate's own
//! generalization of that ownership graph into a value callers hold.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use cdpdrive_types::{CallId, Command, CommandResponse, Envelope, Event, Method, MethodCall};

use crate::correlator::{self, Correlator};
use crate::dispatcher::{Dispatcher, RawEvent};
use crate::error::{CdpError, SessionInitError};
use crate::flags::LaunchOptions;
use crate::pipe::{Frame, PipeWriter};
use crate::process::{self, Launched};
use crate::target::Target;

/// One launched browser process: transport, command registry, and event
/// dispatcher. Never constructed directly by callers — obtained through
/// [`Session::launch`], which hands back the root [`Scope`] instead.
pub struct Session {
    writer: PipeWriter,
    correlator: Correlator,
    dispatcher: Dispatcher,
    output_dir: PathBuf,
    close_grace_period: Duration,
    child: AsyncMutex<Option<tokio::process::Child>>,
    root_cancellation: CancellationToken,
    closed: AtomicBool,
}

impl Session {
    /// Launch a browser process per `opts` and perform the startup
    /// handshake (`Browser.getVersion`). Returns the root [`Scope`] that
    /// owns the session's lifetime.
    #[instrument(skip(opts))]
    pub async fn launch(opts: LaunchOptions) -> Result<Scope, CdpError> {
        let Launched {
            child,
            output_dir,
            reader,
            writer,
        } = process::launch(&opts).await.map_err(CdpError::SessionInit)?;

        Self::start(Some(child), output_dir, reader, writer, &opts).await
    }

    /// Drive the reader/correlator/dispatcher machinery over an
    /// already-open transport instead of spawning a browser process.
    ///
    /// Not part of the spec's public surface — it exists so the integration
    /// tests under `tests/` can exercise §8's end-to-end scenarios against
    /// an in-process fake browser instead of a real Chromium binary.
    #[doc(hidden)]
    pub async fn launch_over_transport(
        reader: crate::pipe::PipeReader,
        writer: crate::pipe::PipeWriter,
        output_dir: PathBuf,
        opts: &LaunchOptions,
    ) -> Result<Scope, CdpError> {
        Self::start(None, output_dir, reader, writer, opts).await
    }

    async fn start(
        child: Option<tokio::process::Child>,
        output_dir: PathBuf,
        reader: crate::pipe::PipeReader,
        writer: crate::pipe::PipeWriter,
        opts: &LaunchOptions,
    ) -> Result<Scope, CdpError> {
        let startup_timeout = opts.startup_timeout;
        let idle_timeout = opts.idle_timeout;
        let close_grace_period = opts.close_grace_period;

        let session = Arc::new(Session {
            writer,
            correlator: Correlator::new(),
            dispatcher: Dispatcher::new(),
            output_dir,
            close_grace_period,
            child: AsyncMutex::new(child),
            root_cancellation: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });

        let reader_session = session.clone();
        tokio::spawn(async move {
            reader_session.run_reader_loop(reader, idle_timeout).await;
        });

        // Forceful teardown (spec §4.5 `Cancel()`, §5 "cancelling the
        // session scope terminates the browser") is driven off of
        // `root_cancellation` the same way `spawn_close_target_on_cancel`
        // drives a tab's `Target.closeTarget`: a background task that wakes
        // up once and tears down, however the cancellation was triggered
        // (an explicit `cancel()`, the reader hitting EOF, or a failed
        // write).
        let terminator_session = session.clone();
        tokio::spawn(async move {
            terminator_session.root_cancellation.cancelled().await;
            terminator_session.force_terminate().await;
        });

        let scope = Scope::root(session.clone());

        let handshake = scope.send_and_wait_raw(
            "Browser.getVersion",
            None,
            serde_json::Value::Null,
        );
        match tokio::time::timeout(startup_timeout, handshake).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                session.teardown_after_failed_launch().await;
                return Err(err);
            }
            Err(_elapsed) => {
                session.teardown_after_failed_launch().await;
                return Err(CdpError::SessionInit(SessionInitError::HandshakeFailed));
            }
        }

        Ok(scope)
    }

    async fn teardown_after_failed_launch(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
        self.correlator.drain();
        self.root_cancellation.cancel();
    }

    /// Forceful teardown (spec §4.5 `Cancel()`, §5 "cancelling the session
    /// scope terminates the browser (kill, not graceful)"): skips
    /// `Browser.close` entirely and escalates straight to
    /// `SIGTERM`/`SIGKILL`, then drains every outstanding request.
    ///
    /// Fires once `root_cancellation` is cancelled, from whatever triggered
    /// it — `Scope::cancel` on the root scope, the reader hitting EOF/an I/O
    /// error, or a failed write. Idempotent with `Scope::close`'s own
    /// teardown via the shared `closed` flag: whichever runs first wins,
    /// the other observes `child` already taken and does nothing.
    async fn force_terminate(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = process::terminate_forcefully(&mut child, self.close_grace_period).await;
        }
        self.correlator.drain();
    }

    #[instrument(skip(self, reader))]
    async fn run_reader_loop(self: Arc<Self>, mut reader: crate::pipe::PipeReader, idle_timeout: Duration) {
        loop {
            let frame = tokio::select! {
                _ = self.root_cancellation.cancelled() => break,
                frame = tokio::time::timeout(idle_timeout, reader.read_frame()) => frame,
            };

            let frame = match frame {
                Ok(Ok(frame)) => frame,
                Ok(Err(io_err)) => {
                    warn!(error = %io_err, "pipe read failed, closing session");
                    break;
                }
                Err(_elapsed) => {
                    debug!("no frame within idle timeout, closing session");
                    break;
                }
            };

            let bytes = match frame {
                Frame::Payload(bytes) => bytes,
                Frame::Eof => {
                    debug!("transport reached EOF");
                    break;
                }
            };

            let envelope: Envelope = match serde_json::from_slice(&bytes) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(error = %err, "dropping unparseable frame");
                    continue;
                }
            };

            if envelope.is_event() {
                let method = envelope.method.clone().unwrap_or_default();
                let params = envelope
                    .params
                    .unwrap_or_else(|| serde_json::value::RawValue::from_string("null".into()).unwrap());
                self.dispatcher.dispatch(RawEvent {
                    method,
                    session_id: envelope.session_id,
                    params,
                });
            } else if envelope.is_reply() {
                self.correlator.resolve(envelope);
            }
        }

        self.closed.store(true, Ordering::SeqCst);
        self.correlator.drain();
        self.root_cancellation.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }
}

/// The capability callers actually hold: cancellation scope plus a
/// reference to the owning [`Session`], optionally narrowed to one
/// [`Target`] (spec §4.4 "second tab").
///
/// Cloning a `Scope` is cheap (two `Arc` bumps and a `CancellationToken`
/// clone, which is itself an `Arc` internally) and sharing one across tasks
/// is the normal way to fan work out under one cancellation boundary.
#[derive(Clone)]
pub struct Scope {
    session: Arc<Session>,
    target: Option<Target>,
    cancellation: CancellationToken,
    /// Set only on the scope [`Session::launch`]/[`Session::launch_over_transport`]
    /// hands back. Distinguishes "cancel the whole session" from "cancel
    /// this derived scope" in [`Scope::cancel`] — a plain `child()` scope's
    /// cancellation must not reach back up and kill the browser out from
    /// under sibling scopes.
    is_root: bool,
}

impl Scope {
    fn root(session: Arc<Session>) -> Self {
        let cancellation = session.root_cancellation.child_token();
        Self {
            session,
            target: None,
            cancellation,
            is_root: true,
        }
    }

    /// Derive a child scope that inherits this scope's target (if any) but
    /// gets its own cancellation token, a child of this one: cancelling the
    /// child never cancels the parent, cancelling the parent always
    /// cancels every descendant.
    pub fn child(&self) -> Self {
        Self {
            session: self.session.clone(),
            target: self.target.clone(),
            cancellation: self.cancellation.child_token(),
            is_root: false,
        }
    }

    /// Derive a scope narrowed to `target`: commands sent through it carry
    /// the target's CDP `sessionId`, and the scope inherits a fresh child
    /// cancellation token so closing the tab never has to touch the parent
    /// scope's lifetime.
    pub fn with_target(&self, target: Target) -> Self {
        Self {
            session: self.session.clone(),
            target: Some(target),
            cancellation: self.cancellation.child_token(),
            is_root: false,
        }
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Resolves once this scope (or any ancestor) has been cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel this scope and every descendant derived from it. Idempotent
    /// (spec §7 "Cancel/Close idempotence"): cancelling twice is a no-op the
    /// second time.
    ///
    /// On the root scope this is the forceful shutdown path (spec §4.5
    /// `Cancel()`, §5 "cancelling the session scope terminates the browser,
    /// kill not graceful"): it cancels `session.root_cancellation` directly
    /// rather than just this scope's own token, which — since every other
    /// scope's token descends from it — tears down the whole scope tree and
    /// wakes the background task that SIGTERMs/SIGKILLs the browser
    /// process (see [`Session::force_terminate`]). On a derived scope
    /// (`child()`/`with_target()`) it only cancels that scope's own
    /// subtree, per spec §5 "cancelling a child (second-tab) scope closes
    /// only its target".
    pub fn cancel(&self) {
        if self.is_root {
            self.session.root_cancellation.cancel();
        } else {
            self.cancellation.cancel();
        }
    }

    pub fn output_dir(&self) -> &std::path::Path {
        self.session.output_dir()
    }

    /// "Second tab" (spec §4.5): attach a new target to the same browser
    /// session rather than spawning a new process. Internally issues
    /// `Target.createTarget` then `Target.attachToTarget` (flattened
    /// session protocol) on the raw transport — the core has no typed
    /// binding for these, the same way `Session::launch`'s handshake call
    /// doesn't depend on `cdpdrive_cdp`.
    ///
    /// The returned scope is a child of `self`: cancelling it sends
    /// `Target.closeTarget` for this target only, while cancelling `self` (or
    /// any ancestor) still tears down the whole browser and takes this tab
    /// down with it.
    #[instrument(skip(self))]
    pub async fn open_tab(&self, url: impl Into<String>) -> Result<Scope, CdpError> {
        #[derive(serde::Deserialize)]
        struct CreateTargetResult {
            #[serde(rename = "targetId")]
            target_id: String,
        }
        #[derive(serde::Deserialize)]
        struct AttachToTargetResult {
            #[serde(rename = "sessionId")]
            session_id: String,
        }

        let create_params = serde_json::json!({ "url": url.into() });
        let (_, created) = self
            .send_and_wait_raw("Target.createTarget", None, create_params)
            .await?;
        let CreateTargetResult { target_id } =
            serde_json::from_str(created.get()).map_err(CdpError::Marshal)?;

        let attach_params = serde_json::json!({ "targetId": target_id, "flatten": true });
        let (_, attached) = self
            .send_and_wait_raw("Target.attachToTarget", None, attach_params)
            .await?;
        let AttachToTargetResult { session_id } =
            serde_json::from_str(attached.get()).map_err(CdpError::Marshal)?;

        let target = Target::new(crate::target::TargetId(target_id), crate::target::CdpSessionId(session_id));
        let tab_scope = self.with_target(target.clone());
        self.spawn_close_target_on_cancel(tab_scope.clone(), target);
        Ok(tab_scope)
    }

    /// Best-effort `Target.closeTarget` once `tab_scope`'s own cancellation
    /// token fires, whether from an explicit `cancel()` on it or from an
    /// ancestor scope (including the whole session) tearing down. Sent
    /// through `self`, which by construction outlives `tab_scope`.
    fn spawn_close_target_on_cancel(&self, tab_scope: Scope, target: Target) {
        let closer = self.clone();
        tokio::spawn(async move {
            tab_scope.cancelled().await;
            let params = serde_json::json!({ "targetId": target.target_id.0 });
            let _ = closer.send_and_wait_raw("Target.closeTarget", None, params).await;
        });
    }

    /// Send a command and wait for its reply (spec §3 `SendAndWait`).
    ///
    /// Returns a [`CommandResponse`], tagging the deserialized result with
    /// the id and method it answers (teacher's `execute()` shape) rather
    /// than handing back a bare `C::Response` — callers that only want the
    /// result still reach it via `Deref`.
    pub async fn send_and_wait<C: Command>(&self, command: C) -> Result<CommandResponse<C::Response>, CdpError> {
        let method = command.identifier().into_owned();
        let params = serde_json::to_value(&command).map_err(CdpError::Marshal)?;
        let (id, raw) = self.send_and_wait_raw(&method, self.session_id_for_send(), params).await?;
        let result = serde_json::from_str(raw.get()).map_err(CdpError::Marshal)?;
        Ok(CommandResponse {
            id,
            result,
            method: method.into(),
        })
    }

    /// Send a command without waiting for its reply (spec §3 `Send`). The
    /// command still receives a protocol-unique id; its eventual reply is
    /// simply never matched to a waiter.
    pub async fn send<C: Command>(&self, command: C) -> Result<CallId, CdpError> {
        let method = command.identifier().into_owned();
        let params = serde_json::to_value(&command).map_err(CdpError::Marshal)?;
        self.send_raw(&method, self.session_id_for_send(), params).await
    }

    fn session_id_for_send(&self) -> Option<String> {
        self.target.as_ref().map(|t| t.session_id.0.clone())
    }

    async fn send_raw(
        &self,
        method: &str,
        session_id: Option<String>,
        params: serde_json::Value,
    ) -> Result<CallId, CdpError> {
        if self.session.is_closed() {
            return Err(CdpError::SessionClosed);
        }
        let id = self.session.correlator.allocate_id();
        self.write_call(id, method, session_id, params).await?;
        Ok(id)
    }

    async fn send_and_wait_raw(
        &self,
        method: &str,
        session_id: Option<String>,
        params: serde_json::Value,
    ) -> Result<(CallId, Box<serde_json::value::RawValue>), CdpError> {
        if self.session.is_closed() {
            return Err(CdpError::SessionClosed);
        }
        self.send_and_wait_raw_unchecked(method, session_id, params).await
    }

    /// As [`Scope::send_and_wait_raw`], but without the `is_closed` gate.
    /// Used only by [`Scope::close`] to send the graceful `Browser.close`
    /// itself, at the moment the session has just been marked closed for
    /// every other caller — that flag must not also block the one command
    /// whose job is to cause the close.
    async fn send_and_wait_raw_unchecked(
        &self,
        method: &str,
        session_id: Option<String>,
        params: serde_json::Value,
    ) -> Result<(CallId, Box<serde_json::value::RawValue>), CdpError> {
        // Spec §8 item 10: an already-cancelled scope returns `Cancelled`
        // without writing a frame, not a race decided by `select!`.
        if self.cancellation.is_cancelled() {
            return Err(CdpError::Cancelled);
        }
        let (id, rx) = self.session.correlator.register();
        if let Err(err) = self.write_call(id, method, session_id, params).await {
            self.session.correlator.forget(id);
            return Err(err);
        }

        tokio::select! {
            _ = self.cancellation.cancelled() => {
                self.session.correlator.forget(id);
                Err(CdpError::Cancelled)
            }
            reply = correlator::await_reply(rx) => reply.map(|raw| (id, raw)),
        }
    }

    async fn write_call(
        &self,
        id: CallId,
        method: &str,
        session_id: Option<String>,
        params: serde_json::Value,
    ) -> Result<(), CdpError> {
        let call = MethodCall {
            id,
            method: method.to_string().into(),
            session_id,
            params: if params.is_null() { None } else { Some(params) },
        };
        let bytes = serde_json::to_vec(&call).map_err(CdpError::Marshal)?;
        self.session
            .writer
            .write_frame(&bytes)
            .await
            .map_err(|err| CdpError::TransportClosed(err.to_string()))
    }

    /// Subscribe to every occurrence of event `E` (spec §3
    /// `SubscribeEvent`). Matches solely on `E::NAME`, not on session id:
    /// callers that care which target an event came from check
    /// [`RawEvent::session_id`] themselves via [`Scope::subscribe_raw`].
    pub fn subscribe_event<E: Event>(&self) -> EventStream<E> {
        EventStream {
            rx: self.session.dispatcher.subscribe(E::NAME),
            _marker: PhantomData,
        }
    }

    /// Subscribe to the raw, not-yet-deserialized form of an event by
    /// method name, e.g. for a dynamic dispatch table.
    pub fn subscribe_raw(&self, method: impl Into<String>) -> mpsc::Receiver<RawEvent> {
        self.session.dispatcher.subscribe(method)
    }

    /// Graceful teardown (spec §4.1 "Teardown"): send `Browser.close`, then
    /// wait out the configured grace period before escalating to
    /// `SIGTERM`/`SIGKILL`. Idempotent — a second call on an already-closed
    /// session is a no-op.
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<(), CdpError> {
        if self.session.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Goes through the unchecked path: `closed` is already `true` above,
        // and the checked `send_and_wait_raw` would reject the call outright
        // via its own `is_closed` gate, so `Browser.close` would never reach
        // the wire.
        if let Err(err) = self
            .send_and_wait_raw_unchecked("Browser.close", None, serde_json::Value::Null)
            .await
        {
            debug!(error = %err, "graceful Browser.close did not complete, falling through to forceful teardown");
        }

        let grace_period = self.session.close_grace_period;
        let mut guard = self.session.child.lock().await;
        if let Some(mut child) = guard.take() {
            process::terminate_with_grace_period(&mut child, grace_period)
                .await
                .map_err(|err| CdpError::TransportClosed(err.to_string()))?;
        }

        self.session.correlator.drain();
        self.cancellation.cancel();
        Ok(())
    }
}

/// A typed stream over one event kind, backed by the dispatcher's raw
/// per-subscriber mailbox.
pub struct EventStream<E> {
    rx: mpsc::Receiver<RawEvent>,
    _marker: PhantomData<E>,
}

impl<E: Event> EventStream<E> {
    /// Wait for the next occurrence, skipping any frame whose params fail
    /// to deserialize into `E` (should not happen for a correctly named
    /// subscription, but a malformed upstream frame must not wedge the
    /// stream).
    pub async fn next(&mut self) -> Option<E> {
        while let Some(raw) = self.rx.recv().await {
            match serde_json::from_str::<E>(raw.params.get()) {
                Ok(event) => return Some(event),
                Err(err) => {
                    warn!(error = %err, event = E::NAME, "dropping event with unparseable params");
                }
            }
        }
        None
    }
}
