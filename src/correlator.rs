//! Command/reply correlation (spec §3, "Command registry invariant" and
//! "At-most-once delivery"): every outgoing command is assigned a strictly
//! increasing [`CallId`], registered with a one-shot reply channel, and
//! resolved exactly once — by its reply, by transport closure, or by
//! cancellation.
//!
//! Grounded in the teacher's `handler::cmd` pending-command table (an
//! `FnvHashMap<CallId, oneshot::Sender<..>>` keyed the same way), adapted
//! from the teacher's internal-event-loop ownership to a table any task can
//! register against and drain concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use fnv::FnvHashMap;
use tokio::sync::oneshot;

use cdpdrive_types::{CallId, Envelope};

use crate::error::CdpError;

/// What resolving a reply failed with, before [`await_reply`] turns it into
/// the public [`CdpError`] a caller of `send_and_wait` sees.
#[derive(Debug)]
pub enum PendingError {
    Protocol(cdpdrive_types::ProtocolError),
    /// The reply envelope had neither `result` nor `error` (spec §3: a
    /// reply is `{id, result}` or `{id, error}` — never neither).
    Empty,
}

/// A reply, successful or not, addressed to one [`CallId`].
pub type PendingReply = Result<Box<serde_json::value::RawValue>, PendingError>;

/// Issues monotonically increasing [`CallId`]s and matches inbound replies
/// back to the waiter that's expecting them.
///
/// One instance is shared (behind an `Arc`) between the writer task, which
/// allocates ids, and the reader task, which resolves them as replies
/// arrive.
pub struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<FnvHashMap<CallId, oneshot::Sender<PendingReply>>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(FnvHashMap::default()),
        }
    }

    /// Allocate the next [`CallId`] without registering a waiter, for a
    /// fire-and-forget `send` that still needs a protocol-unique id.
    pub fn allocate_id(&self) -> CallId {
        CallId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate the next [`CallId`] and register a waiter for its reply.
    /// Returns the id to stamp onto the outgoing frame and the receiving
    /// half of the reply channel.
    pub fn register(&self) -> (CallId, oneshot::Receiver<PendingReply>) {
        let id = self.allocate_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    /// Remove a waiter without resolving it, e.g. when the caller's future
    /// is dropped before a reply arrives (cancellation-safety: the slot is
    /// freed, no stale sender lingers in the table).
    pub fn forget(&self, id: CallId) {
        self.pending.lock().unwrap().remove(&id);
    }

    /// Route an inbound reply envelope to its waiter, if still registered.
    /// A reply for an id nobody is waiting on (already forgotten, or a
    /// duplicate) is silently dropped: at-most-once delivery means a second
    /// match never fires.
    pub fn resolve(&self, envelope: Envelope) {
        let Some(id) = envelope.id else { return };
        let Some(tx) = self.pending.lock().unwrap().remove(&id) else {
            return;
        };
        let reply = match envelope.error {
            Some(err) => Err(PendingError::Protocol(err)),
            None => match envelope.result {
                Some(result) => Ok(result),
                None => Err(PendingError::Empty),
            },
        };
        let _ = tx.send(reply);
    }

    /// Drain every outstanding waiter, e.g. on transport closure: each one
    /// observes a dropped sender and turns that into [`CdpError::TransportClosed`]
    /// at the call site.
    pub fn drain(&self) {
        self.pending.lock().unwrap().clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

/// Turn a resolved (or abandoned) reply receiver into the public `Result`
/// shape a caller of `send_and_wait` sees.
pub async fn await_reply(rx: oneshot::Receiver<PendingReply>) -> Result<Box<serde_json::value::RawValue>, CdpError> {
    match rx.await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(PendingError::Protocol(protocol_err))) => Err(CdpError::Protocol(protocol_err)),
        Ok(Err(PendingError::Empty)) => Err(CdpError::EmptyReply),
        Err(_closed) => Err(CdpError::TransportClosed(
            "reply channel dropped before a reply arrived".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_monotonically() {
        let c = Correlator::new();
        let (a, _) = c.register();
        let (b, _) = c.register();
        assert!(b.get() > a.get());
    }

    #[tokio::test]
    async fn resolve_delivers_result_to_the_matching_waiter() {
        let c = Correlator::new();
        let (id, rx) = c.register();
        let envelope = Envelope {
            id: Some(id),
            method: None,
            session_id: None,
            params: None,
            result: Some(serde_json::value::RawValue::from_string("{\"ok\":true}".into()).unwrap()),
            error: None,
        };
        c.resolve(envelope);
        let reply = await_reply(rx).await.unwrap();
        assert_eq!(reply.get(), "{\"ok\":true}");
    }

    #[tokio::test]
    async fn resolve_delivers_protocol_error() {
        let c = Correlator::new();
        let (id, rx) = c.register();
        let envelope = Envelope {
            id: Some(id),
            method: None,
            session_id: None,
            params: None,
            result: None,
            error: Some(cdpdrive_types::ProtocolError {
                code: -32601,
                message: "Method not found".into(),
                data: None,
            }),
        };
        c.resolve(envelope);
        let err = await_reply(rx).await.unwrap_err();
        assert!(matches!(err, CdpError::Protocol(_)));
    }

    /// A reply with neither `result` nor `error` is malformed (spec §3)
    /// and must surface as its own error, not a synthesized success.
    #[tokio::test]
    async fn resolve_with_neither_result_nor_error_yields_empty_reply() {
        let c = Correlator::new();
        let (id, rx) = c.register();
        let envelope = Envelope {
            id: Some(id),
            method: None,
            session_id: None,
            params: None,
            result: None,
            error: None,
        };
        c.resolve(envelope);
        let err = await_reply(rx).await.unwrap_err();
        assert!(matches!(err, CdpError::EmptyReply));
    }

    #[tokio::test]
    async fn forgotten_waiter_never_sees_a_late_reply() {
        let c = Correlator::new();
        let (id, rx) = c.register();
        c.forget(id);
        assert_eq!(c.pending_count(), 0);
        drop(rx);
        // A late reply for a forgotten id is simply dropped, not an error.
        let envelope = Envelope {
            id: Some(id),
            method: None,
            session_id: None,
            params: None,
            result: Some(serde_json::value::RawValue::from_string("null".into()).unwrap()),
            error: None,
        };
        c.resolve(envelope);
    }

    /// OQ-2: reply ordering between different ids is not guaranteed (spec
    /// §4.3 "Ordering"); each caller must still observe exactly its own
    /// reply regardless of the order the browser answers in.
    #[tokio::test]
    async fn out_of_order_replies_are_independent() {
        let c = Correlator::new();
        let (id1, rx1) = c.register();
        let (id2, rx2) = c.register();
        assert!(id2.get() > id1.get());

        // Resolve id2 first, as the browser may answer out of order.
        c.resolve(Envelope {
            id: Some(id2),
            method: None,
            session_id: None,
            params: None,
            result: Some(serde_json::value::RawValue::from_string("{\"who\":2}".into()).unwrap()),
            error: None,
        });
        c.resolve(Envelope {
            id: Some(id1),
            method: None,
            session_id: None,
            params: None,
            result: Some(serde_json::value::RawValue::from_string("{\"who\":1}".into()).unwrap()),
            error: None,
        });

        let reply1 = await_reply(rx1).await.unwrap();
        let reply2 = await_reply(rx2).await.unwrap();
        assert_eq!(reply1.get(), "{\"who\":1}");
        assert_eq!(reply2.get(), "{\"who\":2}");
    }

    #[tokio::test]
    async fn drain_turns_every_waiter_into_transport_closed() {
        let c = Correlator::new();
        let (_id1, rx1) = c.register();
        let (_id2, rx2) = c.register();
        c.drain();
        assert!(matches!(
            await_reply(rx1).await.unwrap_err(),
            CdpError::TransportClosed(_)
        ));
        assert!(matches!(
            await_reply(rx2).await.unwrap_err(),
            CdpError::TransportClosed(_)
        ));
    }
}
