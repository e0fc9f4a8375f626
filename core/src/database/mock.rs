use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    database::{EngineError, SqlEngine},
    record::Value,
};

/// In-memory engine recording every script it is asked to run.
pub struct MockEngine {
    failures_remaining: Mutex<u32>,
    max_parameters: usize,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        MockEngine {
            failures_remaining: Mutex::new(0),
            max_parameters: usize::MAX,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the first `failures` calls with a deadlock error.
    pub fn failing(failures: u32) -> Self {
        MockEngine { failures_remaining: Mutex::new(failures), ..Self::default() }
    }

    pub fn with_max_parameters(mut self, max_parameters: usize) -> Self {
        self.max_parameters = max_parameters;
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlEngine for MockEngine {
    async fn execute(&self, script: &str, args: &[Value]) -> Result<u64, EngineError> {
        self.calls.lock().unwrap().push((script.to_string(), args.to_vec()));

        let mut failures = self.failures_remaining.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(EngineError::Execution("transaction was deadlocked".to_string()));
        }

        Ok(script.split(';').count() as u64)
    }

    fn max_parameters(&self) -> usize {
        self.max_parameters
    }
}
