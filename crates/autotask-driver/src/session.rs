/*
[INPUT]:  Session options (headless mode, download directory) from task settings
[OUTPUT]: Object-safe traits every UI automation backend implements
[POS]:    Boundary layer - the capability set the task core is allowed to call
[UPDATE]: When tasks need a new UI capability (new trait method on every backend)
*/

use crate::error::Result;
use std::fmt;
use std::path::PathBuf;

/// How a UI element is located.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Css(String),
    XPath(String),
    Id(String),
    Name(String),
    LinkText(String),
}

impl Selector {
    pub fn css(value: impl Into<String>) -> Self {
        Selector::Css(value.into())
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Selector::XPath(value.into())
    }

    pub fn id(value: impl Into<String>) -> Self {
        Selector::Id(value.into())
    }

    pub fn name(value: impl Into<String>) -> Self {
        Selector::Name(value.into())
    }

    pub fn link_text(value: impl Into<String>) -> Self {
        Selector::LinkText(value.into())
    }

    /// W3C locator strategy and value.
    ///
    /// `id` and `name` have no strategy of their own in the W3C protocol, so they map to
    /// attribute CSS selectors.
    pub fn to_locator(&self) -> (&'static str, String) {
        match self {
            Selector::Css(value) => ("css selector", value.clone()),
            Selector::XPath(value) => ("xpath", value.clone()),
            Selector::Id(value) => ("css selector", format!("[id=\"{value}\"]")),
            Selector::Name(value) => ("css selector", format!("[name=\"{value}\"]")),
            Selector::LinkText(value) => ("link text", value.clone()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(value) => write!(f, "css={value}"),
            Selector::XPath(value) => write!(f, "xpath={value}"),
            Selector::Id(value) => write!(f, "id={value}"),
            Selector::Name(value) => write!(f, "name={value}"),
            Selector::LinkText(value) => write!(f, "link={value}"),
        }
    }
}

/// A located UI element.
pub trait UiElement: Send {
    fn click(&self) -> Result<()>;

    fn type_text(&self, text: &str) -> Result<()>;

    /// Visible (rendered) text of the element.
    fn text(&self) -> Result<String>;
}

/// A live automation session against one browser or desktop application.
pub trait UiDriver: Send {
    /// Current page URL, or the active window title for desktop backends.
    fn current_location(&self) -> Result<String>;

    fn navigate(&mut self, location: &str) -> Result<()>;

    /// Returns `Ok(None)` when nothing matches; other failures are errors.
    fn find_element(&self, selector: &Selector) -> Result<Option<Box<dyn UiElement>>>;

    fn find_elements(&self, selector: &Selector) -> Result<Vec<Box<dyn UiElement>>>;

    /// Handles of all open tabs/windows, in opening order.
    fn window_handles(&self) -> Result<Vec<String>>;

    fn switch_to_window(&mut self, handle: &str) -> Result<()>;

    /// Closes the current tab/window.
    fn close_window(&mut self) -> Result<()>;

    fn close_session(&mut self) -> Result<()>;
}

/// Options used when a session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub headless: bool,
    pub download_dir: Option<PathBuf>,
    pub window_size: (u32, u32),
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            headless: true,
            download_dir: None,
            window_size: (1920, 1080),
        }
    }
}

/// Creates sessions; one per task run.
pub trait DriverFactory: Send + Sync {
    fn create_session(&self, config: &DriverConfig) -> Result<Box<dyn UiDriver>>;
}

impl<F> DriverFactory for F
where
    F: Fn(&DriverConfig) -> Result<Box<dyn UiDriver>> + Send + Sync,
{
    fn create_session(&self, config: &DriverConfig) -> Result<Box<dyn UiDriver>> {
        self(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_locators() {
        assert_eq!(
            Selector::css("#login").to_locator(),
            ("css selector", "#login".to_string())
        );
        assert_eq!(
            Selector::id("user").to_locator(),
            ("css selector", "[id=\"user\"]".to_string())
        );
        assert_eq!(
            Selector::name("q").to_locator(),
            ("css selector", "[name=\"q\"]".to_string())
        );
        assert_eq!(
            Selector::xpath("//button").to_locator(),
            ("xpath", "//button".to_string())
        );
        assert_eq!(
            Selector::link_text("Next").to_locator(),
            ("link text", "Next".to_string())
        );
    }

    #[test]
    fn test_selector_display() {
        assert_eq!(Selector::css("div.row").to_string(), "css=div.row");
        assert_eq!(Selector::xpath("//a").to_string(), "xpath=//a");
    }

    #[test]
    fn test_default_driver_config_is_headless() {
        let config = DriverConfig::default();
        assert!(config.headless);
        assert_eq!(config.window_size, (1920, 1080));
        assert!(config.download_dir.is_none());
    }
}
