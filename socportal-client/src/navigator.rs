//! Navigation capability
//!
//! The pipeline and guard decide where the user should go; a `Navigator`
//! carries it out. A browser shell would drive its router, the CLI prints the
//! target, tests record it.

use std::sync::{Mutex, PoisonError};
use tracing::info;

pub trait Navigator: Send + Sync {
    /// Current location, path plus optional query
    fn current_path(&self) -> String;

    fn redirect(&self, location: &str);
}

#[derive(Debug, Default)]
struct NavigationState {
    current: String,
    history: Vec<String>,
}

/// Navigator that only records where it was sent
#[derive(Debug)]
pub struct MemoryNavigator {
    state: Mutex<NavigationState>,
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::at("/")
    }
}

impl MemoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at `location`
    pub fn at(location: &str) -> Self {
        Self {
            state: Mutex::new(NavigationState {
                current: location.to_string(),
                history: Vec::new(),
            }),
        }
    }

    /// Move without recording a redirect, like a user clicking a link
    pub fn visit(&self, location: &str) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).current = location.to_string();
    }

    /// Redirects in the order they happened
    pub fn redirects(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .clone()
    }

    pub fn last_redirect(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .last()
            .cloned()
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    fn redirect(&self, location: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        info!(from = %state.current, to = location, "Redirecting");
        state.current = location.to_string();
        state.history.push(location.to_string());
    }
}
