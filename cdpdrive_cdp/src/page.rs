//! `Page` domain: navigation plus the two events that report a navigation's
//! progress.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use cdpdrive_types::{Command, Event, Method};

#[derive(Debug, Clone, Default, Serialize)]
pub struct Enable {}

impl Method for Enable {
    fn identifier(&self) -> Cow<'static, str> {
        "Page.enable".into()
    }
}

impl Command for Enable {
    type Response = serde_json::Value;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigate {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

impl Navigate {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            referrer: None,
        }
    }
}

impl Method for Navigate {
    fn identifier(&self) -> Cow<'static, str> {
        "Page.navigate".into()
    }
}

impl Command for Navigate {
    type Response = NavigateResult;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResult {
    pub frame_id: String,
    #[serde(default)]
    pub loader_id: Option<String>,
    #[serde(default)]
    pub error_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub loader_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameNavigated {
    pub frame: Frame,
}

impl Method for FrameNavigated {
    fn identifier(&self) -> Cow<'static, str> {
        Self::NAME.into()
    }
}

impl Event for FrameNavigated {
    const NAME: &'static str = "Page.frameNavigated";
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub frame_id: String,
    pub loader_id: String,
    pub name: String,
    pub timestamp: f64,
}

impl Method for LifecycleEvent {
    fn identifier(&self) -> Cow<'static, str> {
        Self::NAME.into()
    }
}

impl Event for LifecycleEvent {
    const NAME: &'static str = "Page.lifecycleEvent";
}
