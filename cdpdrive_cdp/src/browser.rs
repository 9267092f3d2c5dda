//! `Browser` domain: the handshake command every session performs on launch
//! and the command that starts graceful teardown.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use cdpdrive_types::{Command, Method};

/// `Browser.getVersion`: no parameters, returns the browser's version
/// banner. Used as the startup handshake — a session isn't considered
/// ready until this round-trips.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetVersion {}

impl Method for GetVersion {
    fn identifier(&self) -> Cow<'static, str> {
        "Browser.getVersion".into()
    }
}

impl Command for GetVersion {
    type Response = GetVersionResult;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetVersionResult {
    pub protocol_version: String,
    pub product: String,
    pub revision: String,
    pub user_agent: String,
    pub js_version: String,
}

/// `Browser.close`: closes the browser gracefully, ending every target and
/// session it owns.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Close {}

impl Method for Close {
    fn identifier(&self) -> Cow<'static, str> {
        "Browser.close".into()
    }
}

impl Command for Close {
    type Response = serde_json::Value;
}
