//! Source loading, page fetching and the extraction strategies.
//!
//! Each source page goes through an ordered list of strategies, cheapest and
//! most trustworthy first, and the first one to return listings wins:
//!
//! | Strategy | Module | Input | Notes |
//! |----------|--------|-------|-------|
//! | Structured | [`structured`] | static HTML | schema.org `JobPosting` in JSON-LD |
//! | Heuristic | [`heuristic`] | static HTML | guessed containers and fields |
//! | Rendered | [`rendered`] | headless browser DOM | only for sparse or client-rendered pages |
//!
//! Every strategy returns an empty vector when it cannot find anything; that
//! is an expected outcome, not an error.

pub mod browser;
pub mod fetch;
pub mod heuristic;
pub mod rendered;
pub mod sources;
pub mod structured;

use serde::Serialize;
use std::fmt;

/// One extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Structured,
    Heuristic,
    Rendered,
}

impl Strategy {
    /// The order in which the per-source orchestrator tries strategies.
    pub const ORDER: [Strategy; 3] = [Strategy::Structured, Strategy::Heuristic, Strategy::Rendered];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Structured => "structured",
            Strategy::Heuristic => "heuristic",
            Strategy::Rendered => "rendered",
        }
    }

    /// Whether the strategy needs a headless browser.
    pub fn needs_browser(&self) -> bool {
        matches!(self, Strategy::Rendered)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_order_is_by_cost() {
        assert_eq!(Strategy::ORDER[0], Strategy::Structured);
        assert_eq!(Strategy::ORDER[2], Strategy::Rendered);
        assert!(Strategy::ORDER.iter().filter(|s| s.needs_browser()).count() == 1);
    }

    #[test]
    fn test_strategy_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Strategy::Heuristic).unwrap(), "\"heuristic\"");
        assert_eq!(Strategy::Rendered.to_string(), "rendered");
    }
}
