/*
[INPUT]:  WebDriver endpoint configuration (URL, timeouts) + DriverConfig per session
[OUTPUT]: Blocking WebDriver sessions ready for UI automation calls
[POS]:    Backend layer - HTTP plumbing and session lifecycle
[UPDATE]: When adding endpoints or changing capability negotiation
*/

use crate::error::{DriverError, Result};
use crate::session::{DriverConfig, DriverFactory, Selector, UiDriver, UiElement};
use crate::webdriver::element::{WebElement, element_id_from_value};
use reqwest::Method;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default chromedriver endpoint
const DEFAULT_ENDPOINT: &str = "http://localhost:9515";

/// WebDriver endpoint configuration
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl WebDriverConfig {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}

/// Shared HTTP transport; elements keep a handle to it.
#[derive(Debug)]
pub(crate) struct Transport {
    http_client: Client,
    base_url: Url,
}

impl Transport {
    fn new(config: &WebDriverConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        // Relative joins need a trailing slash to keep path prefixes such as `/wd/hub`.
        let mut endpoint = config.endpoint.clone();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }

        Ok(Self {
            http_client,
            base_url: Url::parse(&endpoint)?,
        })
    }

    /// Send a command and unwrap the `value` member of the response.
    pub(crate) fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.base_url.join(path)?;
        debug!(%method, %url, "webdriver command");

        let mut builder = self.http_client.request(method, url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send()?;
        let status = response.status();
        let payload: Value = response.json()?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if !status.is_success() {
            let error = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(DriverError::WebDriver { error, message });
        }

        Ok(value)
    }
}

/// Factory that opens one Chrome session per task run.
#[derive(Debug, Clone, Default)]
pub struct WebDriverFactory {
    config: WebDriverConfig,
}

impl WebDriverFactory {
    pub fn new(config: WebDriverConfig) -> Self {
        Self { config }
    }
}

impl DriverFactory for WebDriverFactory {
    fn create_session(&self, config: &DriverConfig) -> Result<Box<dyn UiDriver>> {
        let session = WebDriverSession::start(&self.config, config)?;
        Ok(Box::new(session))
    }
}

/// A live W3C WebDriver session.
#[derive(Debug)]
pub struct WebDriverSession {
    transport: Arc<Transport>,
    session_id: String,
    closed: bool,
}

impl WebDriverSession {
    /// POST /session
    pub fn start(endpoint: &WebDriverConfig, config: &DriverConfig) -> Result<Self> {
        let transport = Arc::new(Transport::new(endpoint)?);
        let body = json!({ "capabilities": { "alwaysMatch": chrome_capabilities(config) } });

        let value = transport.send(Method::POST, "session", Some(body))?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::InvalidResponse("missing sessionId".to_string()))?
            .to_string();

        info!(
            session_id = %session_id,
            headless = config.headless,
            "webdriver session created"
        );

        Ok(Self {
            transport,
            session_id,
            closed: false,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn command(&self, method: Method, endpoint: &str, body: Option<Value>) -> Result<Value> {
        if self.closed {
            return Err(DriverError::SessionClosed);
        }
        let path = format!("session/{}/{}", self.session_id, endpoint);
        self.transport.send(method, &path, body)
    }

    fn element(&self, value: &Value) -> Result<Box<dyn UiElement>> {
        let element_id = element_id_from_value(value)?;
        Ok(Box::new(WebElement::new(
            self.transport.clone(),
            self.session_id.clone(),
            element_id,
        )))
    }
}

impl UiDriver for WebDriverSession {
    /// GET /session/{id}/url
    fn current_location(&self) -> Result<String> {
        let value = self.command(Method::GET, "url", None)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::InvalidResponse(format!("url is not a string: {value}")))
    }

    /// POST /session/{id}/url
    fn navigate(&mut self, location: &str) -> Result<()> {
        self.command(Method::POST, "url", Some(json!({ "url": location })))?;
        Ok(())
    }

    /// POST /session/{id}/element
    fn find_element(&self, selector: &Selector) -> Result<Option<Box<dyn UiElement>>> {
        let (using, value) = selector.to_locator();
        let body = json!({ "using": using, "value": value });
        match self.command(Method::POST, "element", Some(body)) {
            Ok(value) => self.element(&value).map(Some),
            Err(err) if err.is_no_such_element() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// POST /session/{id}/elements
    fn find_elements(&self, selector: &Selector) -> Result<Vec<Box<dyn UiElement>>> {
        let (using, value) = selector.to_locator();
        let body = json!({ "using": using, "value": value });
        let value = self.command(Method::POST, "elements", Some(body))?;
        let Some(items) = value.as_array() else {
            return Err(DriverError::InvalidResponse(format!(
                "elements is not an array: {value}"
            )));
        };
        items.iter().map(|item| self.element(item)).collect()
    }

    /// GET /session/{id}/window/handles
    fn window_handles(&self) -> Result<Vec<String>> {
        let value = self.command(Method::GET, "window/handles", None)?;
        Ok(serde_json::from_value(value)?)
    }

    /// POST /session/{id}/window
    fn switch_to_window(&mut self, handle: &str) -> Result<()> {
        match self.command(Method::POST, "window", Some(json!({ "handle": handle }))) {
            Ok(_) => Ok(()),
            Err(DriverError::WebDriver { error, .. }) if error == "no such window" => {
                Err(DriverError::NoSuchWindow(handle.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    /// DELETE /session/{id}/window
    fn close_window(&mut self) -> Result<()> {
        self.command(Method::DELETE, "window", None)?;
        Ok(())
    }

    /// DELETE /session/{id}
    fn close_session(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let path = format!("session/{}", self.session_id);
        let result = self.transport.send(Method::DELETE, &path, None);
        self.closed = true;
        if let Err(err) = &result {
            warn!(session_id = %self.session_id, error = %err, "failed to delete webdriver session");
        }
        result.map(|_| ())
    }
}

/// Chrome capabilities for a session.
pub fn chrome_capabilities(config: &DriverConfig) -> Value {
    let mut args: Vec<String> = Vec::new();
    if config.headless {
        args.push("--headless".to_string());
        args.push("--disable-gpu".to_string());
        args.push(format!(
            "--window-size={},{}",
            config.window_size.0, config.window_size.1
        ));
        args.push("--use-fake-ui-for-media-stream".to_string());
    } else {
        args.push("--start-maximized".to_string());
    }
    args.push("--disable-extensions".to_string());
    args.push("--disable-infobars".to_string());
    args.push("--disable-notifications".to_string());

    let mut prefs = json!({
        "profile.default_content_settings.popups": 0,
        "download.prompt_for_download": false,
        "download.directory_upgrade": true,
        "safebrowsing.enabled": false,
    });
    if let Some(dir) = &config.download_dir {
        prefs["download.default_directory"] = json!(dir.display().to_string());
    }
    if config.headless {
        prefs["plugins.always_open_pdf_externally"] = json!(true);
    }

    json!({
        "browserName": "chrome",
        "goog:chromeOptions": {
            "args": args,
            "prefs": prefs,
            "excludeSwitches": ["enable-logging"],
        },
    })
}
