//! `Runtime` domain: evaluating an expression in the page's main context.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use cdpdrive_types::{Command, Method};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluate {
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub await_promise: Option<bool>,
}

impl Evaluate {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            return_by_value: None,
            await_promise: None,
        }
    }

    pub fn return_by_value(mut self, value: bool) -> Self {
        self.return_by_value = Some(value);
        self
    }
}

impl Method for Evaluate {
    fn identifier(&self) -> Cow<'static, str> {
        "Runtime.evaluate".into()
    }
}

impl Command for Evaluate {
    type Response = EvaluateResult;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    pub result: RemoteObject,
    #[serde(default)]
    pub exception_details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}
