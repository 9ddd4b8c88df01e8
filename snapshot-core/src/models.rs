use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexQuote {
    pub name: String,
    pub value: f64,
    pub change: f64,
    pub change_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThemeSummary {
    pub name: String,
    pub count: u32,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signal {
    pub kind: String,
    pub label: String,
}

/// One entity row of the aggregate snapshot, analytics already applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockSummary {
    pub code: String,
    pub name: String,
    pub market: String,
    pub price: i64,
    pub change: i64,
    pub change_pct: f64,
    pub volume: i64,
    pub trade_value: i64,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub signals: Vec<Signal>,
    #[serde(default)]
    pub opinion: Option<String>,
}

/// Immutable aggregate view of the market at `generated_at`.
///
/// A snapshot is replaced wholesale on every successful refresh and is shared
/// behind an `Arc` once published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub indices: Vec<IndexQuote>,
    #[serde(default)]
    pub themes: Vec<ThemeSummary>,
    #[serde(default)]
    pub stocks: Vec<StockSummary>,
    pub source: String,
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
}

impl Snapshot {
    /// Entity identifiers that need a detail fetch, in list order.
    ///
    /// Blank codes are skipped and duplicates collapse to their first position.
    pub fn entity_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.stocks
            .iter()
            .map(|stock| stock.code.trim())
            .filter(|code| !code.is_empty())
            .filter(|code| seen.insert(*code))
            .map(ToOwned::to_owned)
            .collect()
    }
}

/// Floor-trader pivot levels computed from the previous session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PivotLevels {
    pub pivot: f64,
    pub r1: f64,
    pub r2: f64,
    pub s1: f64,
    pub s2: f64,
}

impl PivotLevels {
    pub fn from_previous_session(high: f64, low: f64, close: f64) -> Self {
        let pivot = (high + low + close) / 3.0;
        let range = high - low;
        Self {
            pivot: pivot.round(),
            r1: (2.0 * pivot - low).round(),
            r2: (pivot + range).round(),
            s1: (2.0 * pivot - high).round(),
            s2: (pivot - range).round(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub date: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FinancialFigures {
    pub sales: Option<f64>,
    pub operating_profit: Option<f64>,
    pub net_income: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvestorTrend {
    pub date: String,
    pub institution: i64,
    pub foreigner: i64,
    pub foreigner_shares: Option<i64>,
    pub foreigner_ratio: Option<f64>,
}

/// Supplementary per-entity record, fetched independently of the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityDetail {
    pub code: String,
    pub name: String,
    pub price: i64,
    pub change: i64,
    pub change_pct: f64,
    pub volume: i64,
    pub trade_value: i64,
    pub market: String,
    #[serde(default)]
    pub pivot: Option<PivotLevels>,
    #[serde(default)]
    pub prev_high: Option<f64>,
    #[serde(default)]
    pub prev_low: Option<f64>,
    #[serde(default)]
    pub prev_close: Option<f64>,
    #[serde(default)]
    pub news: Vec<NewsItem>,
    /// Keyed by reporting period, e.g. `"2024.12"`.
    #[serde(default)]
    pub financials: BTreeMap<String, FinancialFigures>,
    #[serde(default)]
    pub investor_trends: Vec<InvestorTrend>,
}

impl EntityDetail {
    /// Fill in pivot levels from the previous session when the upstream omitted them.
    pub fn with_derived_pivot(mut self) -> Self {
        if self.pivot.is_none() {
            if let (Some(high), Some(low), Some(close)) =
                (self.prev_high, self.prev_low, self.prev_close)
            {
                self.pivot = Some(PivotLevels::from_previous_session(high, low, close));
            }
        }
        self
    }
}
