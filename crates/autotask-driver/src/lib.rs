/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public UI driver crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod error;
pub mod memory;
pub mod session;
pub mod webdriver;

pub use error::{DriverError, Result};

pub use memory::{Action, MemoryDriver, MemoryDriverFactory};

pub use session::{DriverConfig, DriverFactory, Selector, UiDriver, UiElement};

pub use webdriver::{WebDriverConfig, WebDriverFactory, WebDriverSession, WebElement};
