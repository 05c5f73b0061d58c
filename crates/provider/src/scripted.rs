//! Scripted provider for tests
//!
//! Each credential value owns a queue of outcomes. `generate` pops the next
//! outcome for the handle's credential; an empty queue answers with a
//! deterministic "generated by <key>" text. Every call is recorded so tests can
//! assert which credentials were tried and in what order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::Secret;

use crate::{GenerateFuture, GenerationProvider, ProviderError};

/// Handle produced by `ScriptedProvider::initialize`.
#[derive(Debug, Clone)]
pub struct ScriptedHandle {
    pub key: String,
}

enum Step {
    Reply(String),
    Fail(ProviderError),
    Stall(Duration),
}

#[derive(Default)]
pub struct ScriptedProvider {
    steps: Mutex<HashMap<String, VecDeque<Step>>>,
    rejected: HashSet<String>,
    calls: Mutex<Vec<String>>,
    initializations: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply for `key`.
    pub fn reply(self, key: &str, text: &str) -> Self {
        self.push(key, Step::Reply(text.to_string()))
    }

    /// Queue a failure for `key`.
    pub fn fail(self, key: &str, error: ProviderError) -> Self {
        self.push(key, Step::Fail(error))
    }

    /// Queue a call for `key` that sleeps before replying.
    pub fn stall(self, key: &str, duration: Duration) -> Self {
        self.push(key, Step::Stall(duration))
    }

    /// Make `initialize` fail for `key`.
    pub fn reject(mut self, key: &str) -> Self {
        self.rejected.insert(key.to_string());
        self
    }

    /// Keys used by `generate`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of successful `initialize` calls.
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::Relaxed)
    }

    fn push(self, key: &str, step: Step) -> Self {
        if let Ok(mut steps) = self.steps.lock() {
            steps.entry(key.to_string()).or_default().push_back(step);
        }
        self
    }

    fn next_step(&self, key: &str) -> Option<Step> {
        self.steps
            .lock()
            .ok()
            .and_then(|mut steps| steps.get_mut(key).and_then(VecDeque::pop_front))
    }
}

impl GenerationProvider for ScriptedProvider {
    type Handle = ScriptedHandle;

    fn id(&self) -> &str {
        "scripted"
    }

    fn initialize(&self, credential: &Secret<String>) -> crate::Result<ScriptedHandle> {
        let key = credential.expose().clone();
        if self.rejected.contains(&key) {
            return Err(ProviderError::InvalidCredential(format!(
                "scripted rejection for {key}"
            )));
        }
        self.initializations.fetch_add(1, Ordering::Relaxed);
        Ok(ScriptedHandle { key })
    }

    fn generate<'a>(&'a self, handle: &'a ScriptedHandle, _prompt: &'a str) -> GenerateFuture<'a> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(handle.key.clone());
        }
        let step = self.next_step(&handle.key);
        Box::pin(async move {
            match step {
                Some(Step::Reply(text)) => Ok(text),
                Some(Step::Fail(error)) => Err(error),
                Some(Step::Stall(duration)) => {
                    tokio::time::sleep(duration).await;
                    Ok(format!("generated by {} after stall", handle.key))
                }
                None => Ok(format!("generated by {}", handle.key)),
            }
        })
    }
}
