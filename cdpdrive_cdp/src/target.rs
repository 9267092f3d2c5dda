//! `Target` domain: creating a tab and attaching a CDP session to it (spec
//! §4.4 "second tab" scoping) plus the lifecycle events that announce
//! targets coming and going.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use cdpdrive_types::{Command, Event, Method};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTarget {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_window: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,
}

impl CreateTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            new_window: None,
            background: None,
        }
    }
}

impl Method for CreateTarget {
    fn identifier(&self) -> Cow<'static, str> {
        "Target.createTarget".into()
    }
}

impl Command for CreateTarget {
    type Response = CreateTargetResult;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetResult {
    pub target_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTarget {
    pub target_id: String,
    /// Always `true`: cdpdrive only supports the flattened session protocol
    /// (commands addressed by `sessionId`, not nested `Target.sendMessageToTarget`).
    pub flatten: bool,
}

impl AttachToTarget {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            flatten: true,
        }
    }
}

impl Method for AttachToTarget {
    fn identifier(&self) -> Cow<'static, str> {
        "Target.attachToTarget".into()
    }
}

impl Command for AttachToTarget {
    type Response = AttachToTargetResult;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetResult {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseTarget {
    pub target_id: String,
}

impl CloseTarget {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
        }
    }
}

impl Method for CloseTarget {
    fn identifier(&self) -> Cow<'static, str> {
        "Target.closeTarget".into()
    }
}

impl Command for CloseTarget {
    type Response = CloseTargetResult;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseTargetResult {
    pub success: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub target_id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    pub title: String,
    pub url: String,
    pub attached: bool,
    #[serde(default)]
    pub opener_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCreated {
    pub target_info: TargetInfo,
}

impl Method for TargetCreated {
    fn identifier(&self) -> Cow<'static, str> {
        Self::NAME.into()
    }
}

impl Event for TargetCreated {
    const NAME: &'static str = "Target.targetCreated";
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDestroyed {
    pub target_id: String,
}

impl Method for TargetDestroyed {
    fn identifier(&self) -> Cow<'static, str> {
        Self::NAME.into()
    }
}

impl Event for TargetDestroyed {
    const NAME: &'static str = "Target.targetDestroyed";
}
