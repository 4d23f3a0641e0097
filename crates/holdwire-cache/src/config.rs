#![forbid(unsafe_code)]

//! Cache configuration.

use std::sync::Arc;

/// Configuration for a [`KeyedCache`](crate::KeyedCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Diagnostic label, used in log fields and attached to pending holders.
    pub label: Option<Arc<str>>,
    /// Collapse concurrent fetches of one key onto a single backing request.
    ///
    /// When off, every fetch that finds the key in flight issues a new
    /// request; the newest request owns the entry and older ones only publish
    /// to the holders they were issued for.
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            label: None,
            single_flight: true,
        }
    }
}

impl CacheConfig {
    /// Set a diagnostic label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Toggle single-flight deduplication.
    #[must_use]
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    pub(crate) fn label_str(&self) -> &str {
        self.label.as_deref().unwrap_or("")
    }
}
