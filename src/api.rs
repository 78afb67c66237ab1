use crate::aggregate::{
    self, KeyTotal, MonthPivot, ScatterPoint, TreemapRegion,
};
use crate::data_structures::{
    FilterState, SalesTable, SharedMarket, SharedStockDefaults, SharedTable, TableSource,
};
use crate::dataset;
use crate::filter;
use crate::market::{DailyBar, MarketError};
use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::Query;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

// --- Query parameters ---

/// Filter parameters shared by the dashboard, filter-options, and download
/// routes. The categorical keys repeat (`?region=East&region=West`), which is
/// why these routes use `axum_extra`'s Query.
#[derive(Debug, Default, Deserialize)]
pub struct SalesParams {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub region: Vec<String>,
    #[serde(default)]
    pub state: Vec<String>,
    #[serde(default)]
    pub city: Vec<String>,
}

impl SalesParams {
    fn into_filter_state(self) -> FilterState {
        FilterState {
            start: self.start,
            end: self.end,
            regions: self.region,
            states: self.state,
            cities: self.city,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StockParams {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

// --- Response bodies ---

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub row_count: usize,
    pub total_sales: f64,
    pub sales_by_category: Vec<KeyTotal>,
    pub sales_by_region: Vec<KeyTotal>,
    pub sales_by_segment: Vec<KeyTotal>,
    pub sales_by_month: Vec<KeyTotal>,
    pub treemap: Vec<TreemapRegion>,
    pub month_pivot: MonthPivot,
    pub scatter: Vec<ScatterPoint>,
}

#[derive(Debug, Serialize)]
pub struct FilterOptionsResponse {
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub regions: Vec<String>,
    pub states: Vec<String>,
    pub cities: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Serialize)]
pub struct StockDashboardResponse {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub tail: Vec<DailyBar>,
    pub close: Vec<ChartPoint>,
    pub volume: Vec<ChartPoint>,
    pub profile: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub rows: usize,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
}

fn dataset_not_loaded() -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        "No sales dataset is loaded; upload one or fix the configured fallback file",
    )
        .into_response()
}

// --- Sales explorer handlers ---

#[instrument(skip(table_state))]
pub async fn sales_dashboard_handler(
    State(table_state): State<SharedTable>,
    Query(params): Query<SalesParams>,
) -> Response {
    debug!("Received sales dashboard request");

    let table = table_state.lock().await;
    if table.is_empty() {
        warn!("Dashboard requested before a dataset was loaded");
        return dataset_not_loaded();
    }

    let filter_state = params.into_filter_state();
    let rows = filter::apply(&table, &filter_state);

    // Every aggregate is recomputed from the freshly filtered rows; nothing is
    // cached between requests.
    let response = DashboardResponse {
        row_count: rows.len(),
        total_sales: aggregate::total_sales(&rows),
        sales_by_category: aggregate::sales_by_category(&rows),
        sales_by_region: aggregate::sales_by_region(&rows),
        sales_by_segment: aggregate::sales_by_segment(&rows),
        sales_by_month: aggregate::sales_by_month(&rows),
        treemap: aggregate::treemap(&rows),
        month_pivot: aggregate::month_pivot(&rows),
        scatter: aggregate::scatter_points(&rows),
    };

    info!(
        row_count = response.row_count,
        total_sales = response.total_sales,
        "Returning sales dashboard"
    );
    (StatusCode::OK, Json(response)).into_response()
}

/// The multi-select options come from the date-filtered set only, so the
/// three selections never narrow each other's choices.
#[instrument(skip(table_state))]
pub async fn sales_filters_handler(
    State(table_state): State<SharedTable>,
    Query(params): Query<SalesParams>,
) -> Response {
    debug!("Received filter options request");

    let table = table_state.lock().await;
    if table.is_empty() {
        return dataset_not_loaded();
    }

    let date_only = FilterState {
        start: params.start,
        end: params.end,
        ..Default::default()
    };
    let rows = filter::apply(&table, &date_only);

    let response = FilterOptionsResponse {
        min_date: table.min_date,
        max_date: table.max_date,
        regions: distinct_values(&rows, |r| &r.region),
        states: distinct_values(&rows, |r| &r.state),
        cities: distinct_values(&rows, |r| &r.city),
    };

    info!(
        regions = response.regions.len(),
        states = response.states.len(),
        cities = response.cities.len(),
        "Returning filter options"
    );
    (StatusCode::OK, Json(response)).into_response()
}

#[instrument(skip(table_state))]
pub async fn sales_download_handler(
    State(table_state): State<SharedTable>,
    Query(params): Query<SalesParams>,
) -> Response {
    debug!("Received filtered CSV download request");

    let table = table_state.lock().await;
    if table.is_empty() {
        return dataset_not_loaded();
    }

    let filter_state = params.into_filter_state();
    let rows = filter::apply(&table, &filter_state);

    match encode_csv(&table, &rows) {
        Ok(csv_bytes) => {
            info!(row_count = rows.len(), bytes = csv_bytes.len(), "Returning filtered CSV");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"Filtered_Superstore.csv\"".to_string(),
                    ),
                ],
                csv_bytes,
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to encode filtered CSV");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode CSV").into_response()
        }
    }
}

fn distinct_values<F>(rows: &[&crate::data_structures::OrderRow], field: F) -> Vec<String>
where
    F: Fn(&crate::data_structures::OrderRow) -> &str,
{
    rows.iter()
        .map(|r| field(r).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn encode_csv(
    table: &SalesTable,
    rows: &[&crate::data_structures::OrderRow],
) -> Result<Vec<u8>, csv::Error> {
    let mut buf = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut buf);
        writer.write_record(&table.headers)?;
        for row in rows {
            writer.write_record(&row.raw)?;
        }
        writer.flush()?;
    }
    Ok(buf)
}

#[instrument(skip(table_state, body))]
pub async fn sales_upload_handler(
    State(table_state): State<SharedTable>,
    body: Bytes,
) -> Response {
    debug!(bytes = body.len(), "Received dataset upload");

    match dataset::load_from_bytes(&body) {
        Ok(mut new_table) => {
            new_table.source = TableSource::Upload;
            let response = UploadResponse {
                rows: new_table.rows.len(),
                min_date: new_table.min_date,
                max_date: new_table.max_date,
            };
            let mut table = table_state.lock().await;
            *table = new_table;
            info!(rows = response.rows, "Replaced sales dataset from upload");
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            // The previous table stays in place on a bad upload
            warn!(error = %e, "Rejected dataset upload");
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response()
        }
    }
}

// --- Stock viewer handlers ---

#[instrument(skip(market_state, defaults))]
pub async fn stock_default_handler(
    State(market_state): State<SharedMarket>,
    State(defaults): State<SharedStockDefaults>,
    Query(params): Query<StockParams>,
) -> Response {
    let symbol = defaults.symbol.clone();
    stock_dashboard(market_state, defaults, symbol, params).await
}

#[instrument(skip(market_state, defaults))]
pub async fn stock_dashboard_handler(
    State(market_state): State<SharedMarket>,
    State(defaults): State<SharedStockDefaults>,
    Path(symbol): Path<String>,
    Query(params): Query<StockParams>,
) -> Response {
    stock_dashboard(market_state, defaults, symbol, params).await
}

async fn stock_dashboard(
    market_state: SharedMarket,
    defaults: SharedStockDefaults,
    symbol: String,
    params: StockParams,
) -> Response {
    let start = params.start.unwrap_or(defaults.start);
    let end = params.end.unwrap_or(defaults.end);

    if start > end {
        return (StatusCode::BAD_REQUEST, "start date is after end date").into_response();
    }

    debug!(%symbol, %start, %end, "Fetching stock history and profile");

    let mut market = market_state.lock().await;
    let bars = match market.history(&symbol, start, end).await {
        Ok(bars) => bars,
        Err(e) => return market_error_response(&symbol, e),
    };
    let profile = match market.profile(&symbol).await {
        Ok(profile) => profile,
        Err(e) => return market_error_response(&symbol, e),
    };
    drop(market);

    let tail_start = bars.len().saturating_sub(10);
    let response = StockDashboardResponse {
        symbol: symbol.to_uppercase(),
        start,
        end,
        tail: bars[tail_start..].to_vec(),
        close: bars
            .iter()
            .map(|b| ChartPoint { date: b.date, value: b.close })
            .collect(),
        volume: bars
            .iter()
            .map(|b| ChartPoint { date: b.date, value: b.volume as f64 })
            .collect(),
        profile,
    };

    info!(
        symbol = %response.symbol,
        bars = response.close.len(),
        "Returning stock dashboard"
    );
    (StatusCode::OK, Json(response)).into_response()
}

fn market_error_response(symbol: &str, error: MarketError) -> Response {
    match error {
        MarketError::NoData => {
            warn!(%symbol, "Provider returned no data");
            (
                StatusCode::NOT_FOUND,
                format!("No data for symbol '{symbol}'"),
            )
                .into_response()
        }
        MarketError::InvalidSymbol(rejected) => {
            warn!(%symbol, "Rejected malformed symbol");
            (
                StatusCode::BAD_REQUEST,
                format!("Unsupported symbol '{rejected}'"),
            )
                .into_response()
        }
        other => {
            warn!(%symbol, error = %other, "Provider request failed");
            (StatusCode::BAD_GATEWAY, other.to_string()).into_response()
        }
    }
}
