/*
[INPUT]:  Task names from the runner configuration
[OUTPUT]: Fresh AutomatedTask instances built from a name -> constructor table
[POS]:    Task layer - lookup of concrete tasks without runtime reflection
[UPDATE]: When adding a concrete task to the built-in set
*/

use super::AutomatedTask;
use crate::error::TaskError;
use crate::tasks::ExampleTask;
use std::collections::BTreeMap;

pub type TaskConstructor = fn() -> Box<dyn AutomatedTask>;

#[derive(Debug, Default, Clone)]
pub struct TaskRegistry {
    constructors: BTreeMap<String, TaskConstructor>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every task shipped in this crate.
    pub fn with_builtin_tasks() -> Self {
        let mut registry = Self::new();
        registry.register(ExampleTask::NAME, ExampleTask::boxed);
        registry
    }

    /// Returns the constructor previously registered under `name`, if any.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        constructor: TaskConstructor,
    ) -> Option<TaskConstructor> {
        self.constructors.insert(name.into(), constructor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// A new instance every call; task instances are single-use.
    pub fn create(&self, name: &str) -> Result<Box<dyn AutomatedTask>, TaskError> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}
