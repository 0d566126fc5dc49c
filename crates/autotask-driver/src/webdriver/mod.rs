/*
[INPUT]:  WebDriver endpoint URL (chromedriver) and session options
[OUTPUT]: UiDriver implementation speaking W3C WebDriver over HTTP
[POS]:    Backend layer - browser sessions for web automation tasks
[UPDATE]: When adding endpoints or changing Chrome capabilities
*/

pub mod client;
pub mod element;

pub use client::{WebDriverConfig, WebDriverFactory, WebDriverSession};
pub use element::WebElement;
