use thiserror::Error;

use cdpdrive_types::ProtocolError;

/// Everything that can go wrong before a [`crate::session::Scope`] exists:
/// binary resolution, subprocess spawn, or pipe setup (spec §4.1, §7).
#[derive(Debug, Error)]
pub enum SessionInitError {
    #[error(
        "no chrome/chromium executable found; set `LaunchOptions::executable` or `CHROME_PATH`"
    )]
    ExecutableNotFound,

    #[error("failed to spawn browser process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to create pipe transport: {0}")]
    PipeSetup(#[source] std::io::Error),

    #[error("pipe transport is only implemented for unix targets")]
    UnsupportedPlatform,

    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("browser exited before completing startup handshake")]
    HandshakeFailed,
}

/// The seven-kind error taxonomy a running session ever hands back to a
/// caller (spec §7).
#[derive(Debug, Error)]
pub enum CdpError {
    #[error("session initialization failed: {0}")]
    SessionInit(#[from] SessionInitError),

    #[error("session is closed")]
    SessionClosed,

    #[error("transport closed: {0}")]
    TransportClosed(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to marshal command params: {0}")]
    Marshal(#[source] serde_json::Error),

    #[error("received a reply with neither result nor error")]
    EmptyReply,
}

pub type Result<T, E = CdpError> = std::result::Result<T, E>;
