//! Shared data structures used throughout the application.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Dashboard column a token is listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    NewPairs,
    FinalStretch,
    Migrated,
    Trending,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::NewPairs,
        Category::FinalStretch,
        Category::Migrated,
        Category::Trending,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::NewPairs => "new-pairs",
            Category::FinalStretch => "final-stretch",
            Category::Migrated => "migrated",
            Category::Trending => "trending",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized market record for one token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Provider slug, e.g. "bitcoin". Join key between snapshot and stream.
    pub id: String,
    pub name: String,
    pub symbol: String,
    /// USD price.
    pub price: f64,
    #[serde(rename = "change1h")]
    pub change_1h: f64,
    #[serde(rename = "change24h")]
    pub change_24h: f64,
    #[serde(rename = "change7d")]
    pub change_7d: f64,
    #[serde(rename = "volume24h")]
    pub volume_24h: f64,
    pub market_cap: f64,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,
}

/// Price-only update decoded from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceDelta {
    pub id: String,
    pub price: f64,
}

/// Read-only view handed to consumers.
///
/// `tokens` has no defined iteration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadModel {
    pub tokens: HashMap<String, Token>,
    /// Initial snapshot still pending.
    pub loading: bool,
    /// At least one snapshot fetch is in flight.
    pub refreshing: bool,
    /// Snapshot fetch exhausted its retries and no newer snapshot has landed since.
    pub persistent_failure: bool,
    /// At least one entry still comes from the bundled dataset.
    pub fallback_active: bool,
    pub last_error: Option<String>,
}

impl ReadModel {
    pub fn get(&self, id: &str) -> Option<&Token> {
        self.tokens.get(id)
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &Token> {
        self.tokens.values().filter(move |t| t.category == category)
    }

    /// Nothing to render and nothing coming: live data failed and no fallback landed.
    pub fn is_unavailable(&self) -> bool {
        !self.loading && self.persistent_failure && self.tokens.is_empty()
    }
}
