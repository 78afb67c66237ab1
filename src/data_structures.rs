use crate::market::MarketClient;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

// --- Core Data Structures ---

/// One order row from the sales dataset. Typed columns are extracted once at
/// load; `raw` keeps every source field so the CSV download reproduces the
/// full record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRow {
    pub order_date: NaiveDate,
    pub region: String,
    pub state: String,
    pub city: String,
    pub segment: String,
    pub category: String,
    pub sub_category: String,
    pub sales: f64,
    pub profit: f64,
    pub quantity: u64,
    pub raw: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TableSource {
    Fallback,
    Upload,
}

/// The in-memory row set. Headers are trim/lowercase-normalized at load and
/// row order is source order throughout.
#[derive(Clone, Debug)]
pub struct SalesTable {
    pub headers: Vec<String>,
    pub rows: Vec<OrderRow>,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub source: TableSource,
}

impl SalesTable {
    pub fn empty() -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
            min_date: None,
            max_date: None,
            source: TableSource::Fallback,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Date range plus independent categorical selections. Empty selection means
/// no restriction on that column; missing dates default to the table's
/// min/max order date.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterState {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub regions: Vec<String>,
    pub states: Vec<String>,
    pub cities: Vec<String>,
}

/// Defaults for the stock viewer (the original dashboard's input defaults).
#[derive(Clone, Debug)]
pub struct StockDefaults {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

// --- Type Aliases for Shared State ---

// Shared row set, replaced wholesale by uploads and fallback reloads
pub type SharedTable = Arc<Mutex<SalesTable>>;

// Provider client carries its own rate-limit window, so it is shared mutably
pub type SharedMarket = Arc<Mutex<MarketClient>>;

pub type SharedStockDefaults = Arc<StockDefaults>;
