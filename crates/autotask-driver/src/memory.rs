/*
[INPUT]:  Scripted pages, elements and windows set up by tests or dry runs
[OUTPUT]: In-process UiDriver that records every interaction
[POS]:    Backend layer - deterministic stand-in for a real browser
[UPDATE]: When the UiDriver trait grows or tests need new scripted effects
*/

use crate::error::{DriverError, Result};
use crate::session::{DriverConfig, DriverFactory, Selector, UiDriver, UiElement};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An interaction recorded by the in-memory driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Navigate(String),
    Click(String),
    Type { selector: String, text: String },
    SwitchWindow(String),
    CloseWindow(String),
    CloseSession,
}

#[derive(Debug, Clone)]
struct ScriptedElement {
    text: String,
    /// Lookups that still miss before the element shows up.
    hidden_for: usize,
}

/// Page content shared by every session cut from the same driver.
#[derive(Debug, Default)]
struct Script {
    elements: HashMap<Selector, Vec<ScriptedElement>>,
    navigate_on_click: HashMap<Selector, String>,
}

/// Browser state owned by a single session.
#[derive(Debug, Default)]
struct SessionState {
    location: String,
    windows: Vec<String>,
    current_window: usize,
    next_window: usize,
    actions: Vec<Action>,
    closed: bool,
}

impl SessionState {
    fn fresh(location: String) -> Self {
        Self {
            location,
            windows: vec!["window-0".to_string()],
            next_window: 1,
            ..Self::default()
        }
    }
}

/// Scripted driver. Clones share the same session; [`MemoryDriver::new_session`]
/// starts an independent one over the same script.
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    script: Arc<Mutex<Script>>,
    session: Arc<Mutex<SessionState>>,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            session: Arc::new(Mutex::new(SessionState::fresh("about:blank".to_string()))),
        }
    }

    /// Fresh session at the current location with a single window.
    pub fn new_session(&self) -> Self {
        let location = self.state().location.clone();
        Self {
            script: Arc::clone(&self.script),
            session: Arc::new(Mutex::new(SessionState::fresh(location))),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_location(&self, location: impl Into<String>) {
        self.state().location = location.into();
    }

    pub fn add_element(&self, selector: Selector, text: impl Into<String>) {
        self.add_element_after(selector, text, 0);
    }

    /// Element that stays invisible for the first `lookups` queries.
    pub fn add_element_after(&self, selector: Selector, text: impl Into<String>, lookups: usize) {
        self.script()
            .elements
            .entry(selector)
            .or_default()
            .push(ScriptedElement {
                text: text.into(),
                hidden_for: lookups,
            });
    }

    pub fn remove_elements(&self, selector: &Selector) {
        self.script().elements.remove(selector);
    }

    /// Clicking the element changes the current location.
    pub fn navigate_on_click(&self, selector: Selector, location: impl Into<String>) {
        self.script()
            .navigate_on_click
            .insert(selector, location.into());
    }

    /// Opens a new tab and returns its handle. The current tab is unchanged.
    pub fn open_window(&self) -> String {
        let mut state = self.state();
        let handle = format!("window-{}", state.next_window);
        state.next_window += 1;
        state.windows.push(handle.clone());
        handle
    }

    pub fn actions(&self) -> Vec<Action> {
        self.state().actions.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn lookup(&self, selector: &Selector) -> Result<Vec<Box<dyn UiElement>>> {
        if self.is_closed() {
            return Err(DriverError::SessionClosed);
        }
        let mut script = self.script();
        let Some(elements) = script.elements.get_mut(selector) else {
            return Ok(Vec::new());
        };

        let mut found: Vec<Box<dyn UiElement>> = Vec::new();
        for element in elements.iter_mut() {
            if element.hidden_for > 0 {
                element.hidden_for -= 1;
                continue;
            }
            found.push(Box::new(MemoryElement {
                driver: self.clone(),
                selector: selector.clone(),
                text: element.text.clone(),
            }));
        }
        Ok(found)
    }
}

impl UiDriver for MemoryDriver {
    fn current_location(&self) -> Result<String> {
        let state = self.state();
        if state.closed {
            return Err(DriverError::SessionClosed);
        }
        Ok(state.location.clone())
    }

    fn navigate(&mut self, location: &str) -> Result<()> {
        let mut state = self.state();
        if state.closed {
            return Err(DriverError::SessionClosed);
        }
        state.location = location.to_string();
        state.actions.push(Action::Navigate(location.to_string()));
        Ok(())
    }

    fn find_element(&self, selector: &Selector) -> Result<Option<Box<dyn UiElement>>> {
        Ok(self.lookup(selector)?.into_iter().next())
    }

    fn find_elements(&self, selector: &Selector) -> Result<Vec<Box<dyn UiElement>>> {
        self.lookup(selector)
    }

    fn window_handles(&self) -> Result<Vec<String>> {
        let state = self.state();
        if state.closed {
            return Err(DriverError::SessionClosed);
        }
        Ok(state.windows.clone())
    }

    fn switch_to_window(&mut self, handle: &str) -> Result<()> {
        let mut state = self.state();
        let Some(index) = state.windows.iter().position(|window| window == handle) else {
            return Err(DriverError::NoSuchWindow(handle.to_string()));
        };
        state.current_window = index;
        state.actions.push(Action::SwitchWindow(handle.to_string()));
        Ok(())
    }

    fn close_window(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.current_window >= state.windows.len() {
            return Err(DriverError::NoSuchWindow(format!(
                "index {}",
                state.current_window
            )));
        }
        let index = state.current_window;
        let handle = state.windows.remove(index);
        state.actions.push(Action::CloseWindow(handle));
        Ok(())
    }

    fn close_session(&mut self) -> Result<()> {
        let mut state = self.state();
        if !state.closed {
            state.closed = true;
            state.actions.push(Action::CloseSession);
        }
        Ok(())
    }
}

struct MemoryElement {
    driver: MemoryDriver,
    selector: Selector,
    text: String,
}

impl UiElement for MemoryElement {
    fn click(&self) -> Result<()> {
        let target = self.driver.script().navigate_on_click.get(&self.selector).cloned();
        let mut state = self.driver.state();
        state.actions.push(Action::Click(self.selector.to_string()));
        if let Some(location) = target {
            state.location = location;
        }
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<()> {
        self.driver.state().actions.push(Action::Type {
            selector: self.selector.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    fn text(&self) -> Result<String> {
        Ok(self.text.clone())
    }
}

/// Factory cutting a fresh session from one scripted driver per call.
/// Keeps every session it handed out so callers can inspect them afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriverFactory {
    driver: MemoryDriver,
    sessions: Arc<Mutex<Vec<MemoryDriver>>>,
    sessions_created: Arc<AtomicUsize>,
    last_config: Arc<Mutex<Option<DriverConfig>>>,
}

impl MemoryDriverFactory {
    pub fn new(driver: MemoryDriver) -> Self {
        Self {
            driver,
            sessions: Arc::new(Mutex::new(Vec::new())),
            sessions_created: Arc::new(AtomicUsize::new(0)),
            last_config: Arc::new(Mutex::new(None)),
        }
    }

    /// Template driver holding the shared script.
    pub fn driver(&self) -> &MemoryDriver {
        &self.driver
    }

    pub fn sessions(&self) -> Vec<MemoryDriver> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_session(&self) -> Option<MemoryDriver> {
        self.sessions().pop()
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<DriverConfig> {
        self.last_config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DriverFactory for MemoryDriverFactory {
    fn create_session(&self, config: &DriverConfig) -> Result<Box<dyn UiDriver>> {
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        *self
            .last_config
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        let session = self.driver.new_session();
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session.clone());
        Ok(Box::new(session))
    }
}
