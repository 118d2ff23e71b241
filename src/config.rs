//! Runtime configuration for the search core.

use std::time::Duration;

/// Tunables for query coordination and record normalization.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Delay between the last submission and query execution. Rapid
    /// submissions inside this window collapse into a single search.
    pub debounce: Duration,
    /// Maximum matches requested from the semantic index per query.
    pub result_limit: usize,
    /// Currency assigned to new records that do not specify one.
    pub default_currency: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            result_limit: 50,
            default_currency: "CAD".to_string(),
        }
    }
}

impl SearchConfig {
    /// Load config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(val) = dotenvy::var("LEDGER_DEBOUNCE_MS")
            && let Ok(ms) = val.parse()
        {
            cfg.debounce = Duration::from_millis(ms);
        }

        if let Ok(val) = dotenvy::var("LEDGER_RESULT_LIMIT")
            && let Ok(limit) = val.parse()
        {
            cfg.result_limit = limit;
        }

        if let Ok(val) = dotenvy::var("LEDGER_DEFAULT_CURRENCY")
            && !val.trim().is_empty()
        {
            cfg.default_currency = val.trim().to_string();
        }

        cfg
    }
}
