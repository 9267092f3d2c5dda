//! Wire-level vocabulary for the Chrome DevTools Protocol pipe transport.
//!
//! This crate has no I/O and no async: it only describes the three message
//! shapes CDP ever sends over the wire (command, reply, event) and the
//! traits a typed binding crate implements to ride on top of `cdpdrive`'s
//! `Send` / `SendAndWait` / `SubscribeEvent`.

use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Identifier assigned to a single command for the lifetime of a session.
///
/// Strictly increasing per session (spec §3, Command registry invariant).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallId(u64);

impl CallId {
    pub fn new(id: u64) -> Self {
        CallId(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallId({})", self.0)
    }
}

/// A command as it goes out over the wire: `{id, method, params?, sessionId?}`.
#[derive(Debug, Serialize)]
pub struct MethodCall {
    pub id: CallId,
    pub method: Cow<'static, str>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// The `error` object embedded in a failed reply: `{code, message, data?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CDP error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ProtocolError {}

/// The generic inbound envelope (spec §3): one shape wide enough to hold a
/// reply (`id` + `result` xor `error`) or an event (`method`, no `id`).
/// `params`/`result` are kept as [`RawValue`] so typed layers deserialize on
/// demand instead of paying for a full `Value` parse on every frame.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub id: Option<CallId>,
    pub method: Option<Cow<'static, str>>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    pub params: Option<Box<RawValue>>,
    pub result: Option<Box<RawValue>>,
    pub error: Option<ProtocolError>,
}

impl Envelope {
    /// An envelope with a `method` and no `id` is an event (spec §3).
    pub fn is_event(&self) -> bool {
        self.id.is_none() && self.method.is_some()
    }

    /// An envelope with an `id` is a reply, successful or not.
    pub fn is_reply(&self) -> bool {
        self.id.is_some()
    }
}

/// The name a `MethodCall`, a generated binding type, or an [`Envelope`]
/// identifies itself by, e.g. `Page.navigate`.
pub trait Method {
    /// The whole identifier, e.g. `DOM.removeNode`.
    fn identifier(&self) -> Cow<'static, str>;

    /// The domain the method belongs to, e.g. `DOM`.
    fn domain_name(&self) -> Cow<'static, str> {
        self.split().0
    }

    /// The method name inside the domain, e.g. `removeNode`.
    fn method_name(&self) -> Cow<'static, str> {
        self.split().1
    }

    fn split(&self) -> (Cow<'static, str>, Cow<'static, str>) {
        match self.identifier() {
            Cow::Borrowed(id) => {
                let mut iter = id.splitn(2, '.');
                (
                    iter.next().unwrap_or_default().into(),
                    iter.next().unwrap_or_default().into(),
                )
            }
            Cow::Owned(id) => {
                let mut iter = id.splitn(2, '.');
                (
                    Cow::Owned(iter.next().unwrap_or_default().to_string()),
                    Cow::Owned(iter.next().unwrap_or_default().to_string()),
                )
            }
        }
    }
}

/// A typed CDP command: serializes to `params` and names its `Response` type.
///
/// Implemented by hand-written or generated binding types, never by the
/// core, which only ever sees `(method, params: serde_json::Value)` pairs.
pub trait Command: Serialize + Method {
    type Response: DeserializeOwned + fmt::Debug;
}

/// A typed CDP event, keyed by [`Event::NAME`] in the dispatcher's
/// subscription table. `NAME` is an associated constant rather than a
/// `Method::identifier(&self)` call because subscribing happens before any
/// instance of `Self` exists — the caller names the event by type, not by
/// value.
pub trait Event: Method + DeserializeOwned + fmt::Debug {
    const NAME: &'static str;
}

/// The successful result of a [`Command`], tagged with the id and method it
/// answers so callers can correlate responses without holding onto the
/// original request.
#[derive(Debug)]
pub struct CommandResponse<T: fmt::Debug> {
    pub id: CallId,
    pub result: T,
    pub method: Cow<'static, str>,
}

impl<T: fmt::Debug> Deref for CommandResponse<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.result
    }
}
