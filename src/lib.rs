//! Drive a Chromium-based browser over its `--remote-debugging-pipe`
//! transport: launch the process, speak null-terminated-JSON CDP over fds
//! 3/4, and expose that connection as a cancellable [`Scope`] rather than a
//! bag of raw sends.
//!
//! ```no_run
//! use cdpdrive::{LaunchOptions, Session};
//!
//! # async fn run() -> Result<(), cdpdrive::CdpError> {
//! let scope = Session::launch(LaunchOptions::new()).await?;
//! scope.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Typed command/event bindings (the `cdpdrive_cdp` crate) build on top of
//! [`Scope::send_and_wait`] and [`Scope::subscribe_event`]; this crate only
//! ever sees `(method: &str, params: serde_json::Value)` pairs.

#[cfg(not(unix))]
compile_error!("cdpdrive's pipe transport (fds 3/4, dup2) is only implemented for unix targets");

pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod flags;
pub mod pipe;
pub mod process;
pub mod session;
pub mod target;

pub use error::{CdpError, SessionInitError};
pub use flags::{FlagSet, FlagValue, LaunchOptions};
pub use session::{EventStream, Scope, Session};
pub use target::{CdpSessionId, Target, TargetId};
