//! Consecutive-failure tracking per provider.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Counts consecutive failures per provider.
///
/// A provider is available while its count is strictly below `max_failures`.
/// Unknown providers count as healthy.
#[derive(Debug)]
pub struct ProviderHealthTracker {
    failures: RwLock<HashMap<String, u32>>,
    max_failures: u32,
}

impl ProviderHealthTracker {
    pub fn new(max_failures: u32) -> Self {
        Self {
            failures: RwLock::new(HashMap::new()),
            max_failures,
        }
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn failures(&self, provider: &str) -> u32 {
        self.failures.read().get(provider).copied().unwrap_or(0)
    }

    pub fn is_available(&self, provider: &str) -> bool {
        self.failures(provider) < self.max_failures
    }

    pub fn record_success(&self, provider: &str) {
        self.failures.write().insert(provider.to_string(), 0);
    }

    /// Returns the new failure count.
    pub fn record_failure(&self, provider: &str) -> u32 {
        let mut failures = self.failures.write();
        let count = failures.entry(provider.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Take a provider out of rotation until its next success.
    pub fn mark_unhealthy(&self, provider: &str) {
        let mut failures = self.failures.write();
        let count = failures.entry(provider.to_string()).or_insert(0);
        *count = (*count).max(self.max_failures);
    }

    /// The subset of `providers` that is currently available, order kept.
    pub fn available<'a>(&self, providers: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        let failures = self.failures.read();
        providers
            .into_iter()
            .filter(|p| failures.get(p.as_str()).copied().unwrap_or(0) < self.max_failures)
            .cloned()
            .collect()
    }
}
