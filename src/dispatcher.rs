//! Event fan-out (spec §3 "Event dispatcher", §5 "Reader loop must never
//! block"): subscribers register a bounded channel per event name; the
//! reader task delivers with `try_send` and drops the event for any
//! subscriber whose channel is full rather than waiting on a slow consumer.
//!
//! Grounded in the teacher's `subscribe.rs` (`EventStream`/mpsc-per-listener
//! registration) and `handler::mod` dispatch loop, generalized from the
//! teacher's single in-process handler task to a table any number of
//! independent subscribers can register against.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

/// One inbound event, still keyed by its raw method name and carrying its
/// params as an owned [`serde_json::value::RawValue`] so subscribers
/// deserialize into their own typed shape on demand.
#[derive(Debug)]
pub struct RawEvent {
    pub method: std::borrow::Cow<'static, str>,
    pub session_id: Option<String>,
    pub params: Box<serde_json::value::RawValue>,
}

/// Default bound for a subscriber's mailbox. Past this, new events for that
/// subscriber are dropped rather than backing up the reader (spec §3: "a
/// slow consumer must not stall delivery to others or block the reader").
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 128;

struct Subscriber {
    method: String,
    tx: mpsc::Sender<RawEvent>,
}

/// The subscription table: a flat list of `(event name, sender)` pairs.
/// Lookup is linear in subscriber count rather than keyed by method name,
/// because pruning closed subscribers lazily (removing them the next time
/// the table is walked, rather than via an explicit unsubscribe call) is
/// simplest against a `Vec` — subscriber counts per session are small
/// (tens, not thousands), so the linear scan is not a hot path.
#[derive(Default)]
pub struct Dispatcher {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event whose method name equals `method`
    /// (e.g. `"Page.frameNavigated"`). Returns the receiving half; dropping
    /// it unsubscribes lazily, the next time [`Dispatcher::dispatch`] prunes
    /// closed senders.
    pub fn subscribe(&self, method: impl Into<String>) -> mpsc::Receiver<RawEvent> {
        let (tx, rx) = mpsc::channel(DEFAULT_SUBSCRIBER_CAPACITY);
        self.subscribers.lock().unwrap().push(Subscriber {
            method: method.into(),
            tx,
        });
        rx
    }

    /// Deliver one event to every matching, still-open subscriber. Never
    /// awaits: a full mailbox just drops this event for that subscriber.
    /// Called from the reader task, which must never block on a consumer.
    pub fn dispatch(&self, event: RawEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|sub| !sub.tx.is_closed());
        for sub in subscribers.iter() {
            if sub.method == event.method {
                // RawEvent isn't Clone (RawValue allocates); reserialize is
                // the simplest correct multi-subscriber fan-out and it's
                // off the hot path for the common case of zero or one
                // subscriber per method.
                let cloned = RawEvent {
                    method: event.method.clone(),
                    session_id: event.session_id.clone(),
                    params: serde_json::value::RawValue::from_string(event.params.get().to_string())
                        .expect("re-serializing an already-valid RawValue cannot fail"),
                };
                let _ = sub.tx.try_send(cloned);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|sub| !sub.tx.is_closed());
        subscribers.len()
    }
}
