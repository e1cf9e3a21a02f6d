//! Runtime configuration.

use serde::{Deserialize, Serialize};

/// Longest string the engine will build, in UTF-16 code units.
pub const MAX_STRING_LEN: usize = (1 << 30) - 1;

/// Default allocated-bytes threshold that triggers the first cycle collection.
pub const DEFAULT_GC_THRESHOLD: usize = 256 * 1024;

/// Default number of interrupt polls between calls to the interrupt handler.
pub const DEFAULT_INTERRUPT_POLL_INTERVAL: u32 = 10_000;

/// Default native stack budget reported to embedders.
pub const DEFAULT_MAX_STACK_SIZE: usize = 1024 * 1024;

/// Tunables of a [`Runtime`](crate::Runtime).
///
/// Every field has a default, so partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Bytes allocated before an automatic collection runs (0 disables it)
    pub gc_threshold: usize,
    /// Hard cap on accounted bytes (0 = unlimited)
    pub memory_limit: usize,
    /// Longest string accepted by constructors and builders
    pub max_string_len: usize,
    /// Interrupt polls between handler invocations
    pub interrupt_poll_interval: u32,
    pub max_stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gc_threshold: DEFAULT_GC_THRESHOLD,
            memory_limit: 0,
            max_string_len: MAX_STRING_LEN,
            interrupt_poll_interval: DEFAULT_INTERRUPT_POLL_INTERVAL,
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let mut config: RuntimeConfig = serde_json::from_str(text)?;
        config.normalize();
        Ok(config)
    }

    /// Defaults overridden by `QJS_GC_THRESHOLD` and `QJS_MEMORY_LIMIT`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_usize("QJS_GC_THRESHOLD") {
            config.gc_threshold = v;
        }
        if let Some(v) = env_usize("QJS_MEMORY_LIMIT") {
            config.memory_limit = v;
        }
        config
    }

    fn normalize(&mut self) {
        self.max_string_len = self.max_string_len.min(MAX_STRING_LEN);
        if self.interrupt_poll_interval == 0 {
            self.interrupt_poll_interval = 1;
        }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {name}={raw:?}: not an unsigned integer");
            None
        }
    }
}
