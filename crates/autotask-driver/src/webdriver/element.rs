/*
[INPUT]:  Element references returned by find element(s) commands
[OUTPUT]: UiElement handles that click, type, and read text
[POS]:    Backend layer - per-element WebDriver commands
[UPDATE]: When tasks need new element interactions
*/

use crate::error::{DriverError, Result};
use crate::session::UiElement;
use crate::webdriver::client::Transport;
use reqwest::Method;
use serde_json::{Value, json};
use std::sync::Arc;

/// W3C web element identifier key
pub const ELEMENT_KEY: &str = "element-6066-11e4-a6c3-4e5c6f0b4a68";

#[derive(Debug)]
pub struct WebElement {
    transport: Arc<Transport>,
    session_id: String,
    element_id: String,
}

impl WebElement {
    pub(crate) fn new(transport: Arc<Transport>, session_id: String, element_id: String) -> Self {
        Self {
            transport,
            session_id,
            element_id,
        }
    }

    pub fn element_id(&self) -> &str {
        &self.element_id
    }

    fn command(&self, method: Method, endpoint: &str, body: Option<Value>) -> Result<Value> {
        let path = format!(
            "session/{}/element/{}/{}",
            self.session_id, self.element_id, endpoint
        );
        self.transport.send(method, &path, body)
    }
}

impl UiElement for WebElement {
    /// POST /session/{id}/element/{element_id}/click
    fn click(&self) -> Result<()> {
        self.command(Method::POST, "click", Some(json!({})))?;
        Ok(())
    }

    /// POST /session/{id}/element/{element_id}/value
    fn type_text(&self, text: &str) -> Result<()> {
        self.command(Method::POST, "value", Some(json!({ "text": text })))?;
        Ok(())
    }

    /// GET /session/{id}/element/{element_id}/text
    fn text(&self) -> Result<String> {
        let value = self.command(Method::GET, "text", None)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::InvalidResponse(format!("text is not a string: {value}")))
    }
}

pub(crate) fn element_id_from_value(value: &Value) -> Result<String> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DriverError::InvalidResponse(format!("not an element reference: {value}")))
}
