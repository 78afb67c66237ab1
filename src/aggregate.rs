use crate::data_structures::OrderRow;
use serde::Serialize;
use std::collections::BTreeMap;

/// A `(key, sum-of-sales)` row of a summary table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KeyTotal {
    pub key: String,
    pub sales: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct TreemapSubCategory {
    pub sub_category: String,
    pub sales: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct TreemapCategory {
    pub category: String,
    pub sales: f64,
    pub sub_categories: Vec<TreemapSubCategory>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TreemapRegion {
    pub region: String,
    pub sales: f64,
    pub categories: Vec<TreemapCategory>,
}

/// Sub-category × month cross-tabulation. `cells[i][j]` is the sales sum for
/// `rows[i]` in `months[j]`, or null where the combination never occurs.
#[derive(Clone, Debug, Serialize)]
pub struct MonthPivot {
    pub months: Vec<String>,
    pub rows: Vec<MonthPivotRow>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MonthPivotRow {
    pub sub_category: String,
    pub cells: Vec<Option<f64>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScatterPoint {
    pub sales: f64,
    pub profit: f64,
    pub quantity: u64,
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn sum_by<F>(rows: &[&OrderRow], key: F) -> Vec<KeyTotal>
where
    F: Fn(&OrderRow) -> &str,
{
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for row in rows {
        *totals.entry(key(row).to_string()).or_default() += row.sales;
    }
    totals
        .into_iter()
        .map(|(key, sales)| KeyTotal { key, sales })
        .collect()
}

pub fn sales_by_category(rows: &[&OrderRow]) -> Vec<KeyTotal> {
    sum_by(rows, |r| &r.category)
}

pub fn sales_by_region(rows: &[&OrderRow]) -> Vec<KeyTotal> {
    sum_by(rows, |r| &r.region)
}

pub fn sales_by_segment(rows: &[&OrderRow]) -> Vec<KeyTotal> {
    sum_by(rows, |r| &r.segment)
}

/// Sum of sales per calendar month, chronological, keyed `YYYY-MM`.
pub fn sales_by_month(rows: &[&OrderRow]) -> Vec<KeyTotal> {
    use chrono::Datelike;
    let mut totals: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for row in rows {
        let key = (row.order_date.year(), row.order_date.month());
        *totals.entry(key).or_default() += row.sales;
    }
    totals
        .into_iter()
        .map(|((year, month), sales)| KeyTotal {
            key: format!("{year:04}-{month:02}"),
            sales,
        })
        .collect()
}

/// Region → category → sub-category hierarchy for the treemap. Sub-category
/// names are grouped within their full (region, category) path, so a name
/// reused across categories stays a distinct node.
pub fn treemap(rows: &[&OrderRow]) -> Vec<TreemapRegion> {
    let mut tree: BTreeMap<&str, BTreeMap<&str, BTreeMap<&str, f64>>> = BTreeMap::new();
    for row in rows {
        *tree
            .entry(&row.region)
            .or_default()
            .entry(&row.category)
            .or_default()
            .entry(&row.sub_category)
            .or_default() += row.sales;
    }

    tree.into_iter()
        .map(|(region, categories)| {
            let categories: Vec<TreemapCategory> = categories
                .into_iter()
                .map(|(category, subs)| {
                    let sub_categories: Vec<TreemapSubCategory> = subs
                        .into_iter()
                        .map(|(sub_category, sales)| TreemapSubCategory {
                            sub_category: sub_category.to_string(),
                            sales,
                        })
                        .collect();
                    let sales = sub_categories.iter().map(|s| s.sales).sum();
                    TreemapCategory {
                        category: category.to_string(),
                        sales,
                        sub_categories,
                    }
                })
                .collect();
            let sales = categories.iter().map(|c| c.sales).sum();
            TreemapRegion {
                region: region.to_string(),
                sales,
                categories,
            }
        })
        .collect()
}

/// Month-wise sub-category summary. Columns are the month names present in
/// the rows, calendar-ordered; absent combinations stay null rather than zero.
pub fn month_pivot(rows: &[&OrderRow]) -> MonthPivot {
    use chrono::Datelike;
    let mut present_months: Vec<u32> = Vec::new();
    let mut cells: BTreeMap<&str, BTreeMap<u32, f64>> = BTreeMap::new();

    for row in rows {
        let month = row.order_date.month();
        if !present_months.contains(&month) {
            present_months.push(month);
        }
        *cells
            .entry(&row.sub_category)
            .or_default()
            .entry(month)
            .or_default() += row.sales;
    }
    present_months.sort_unstable();

    let pivot_rows = cells
        .into_iter()
        .map(|(sub_category, by_month)| MonthPivotRow {
            sub_category: sub_category.to_string(),
            cells: present_months
                .iter()
                .map(|m| by_month.get(m).copied())
                .collect(),
        })
        .collect();

    MonthPivot {
        months: present_months
            .iter()
            .map(|&m| MONTH_NAMES[(m - 1) as usize].to_string())
            .collect(),
        rows: pivot_rows,
    }
}

/// Per-row projection for the sales/profit scatter plot, sized by quantity.
pub fn scatter_points(rows: &[&OrderRow]) -> Vec<ScatterPoint> {
    rows.iter()
        .map(|row| ScatterPoint {
            sales: row.sales,
            profit: row.profit,
            quantity: row.quantity,
        })
        .collect()
}

pub fn total_sales(rows: &[&OrderRow]) -> f64 {
    rows.iter().map(|r| r.sales).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{FilterState, SalesTable};
    use crate::dataset::load_from_bytes;
    use crate::filter;

    fn table() -> SalesTable {
        let csv = "\
Order Date,Region,State,City,Segment,Category,Sub-Category,Sales,Profit,Quantity
01/10/2021,East,NY,NYC,Consumer,Furniture,Chairs,100,10,2
01/20/2021,West,CA,LA,Corporate,Technology,Phones,50,5,1
03/05/2021,East,NY,Albany,Consumer,Furniture,Tables,30,-3,1
03/25/2021,South,TX,Austin,Home Office,Technology,Phones,20,2,4
";
        load_from_bytes(csv.as_bytes()).unwrap()
    }

    fn all_rows(table: &SalesTable) -> Vec<&crate::data_structures::OrderRow> {
        filter::apply(table, &FilterState::default())
    }

    #[test]
    fn test_partition_sums_agree() {
        let table = table();
        let rows = all_rows(&table);
        let total = total_sales(&rows);

        let by_category: f64 = sales_by_category(&rows).iter().map(|t| t.sales).sum();
        let by_region: f64 = sales_by_region(&rows).iter().map(|t| t.sales).sum();
        let by_segment: f64 = sales_by_segment(&rows).iter().map(|t| t.sales).sum();

        assert!((by_category - total).abs() < 1e-9);
        assert!((by_region - total).abs() < 1e-9);
        assert!((by_segment - total).abs() < 1e-9);
        assert_eq!(total, 200.0);
    }

    #[test]
    fn test_category_totals() {
        let table = table();
        let rows = all_rows(&table);
        let totals = sales_by_category(&rows);
        assert_eq!(
            totals,
            vec![
                KeyTotal { key: "Furniture".to_string(), sales: 130.0 },
                KeyTotal { key: "Technology".to_string(), sales: 70.0 },
            ]
        );
    }

    #[test]
    fn test_month_series_chronological() {
        let table = table();
        let rows = all_rows(&table);
        let months = sales_by_month(&rows);
        let keys: Vec<_> = months.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["2021-01", "2021-03"]);
        assert_eq!(months[0].sales, 150.0);
        assert_eq!(months[1].sales, 50.0);
    }

    #[test]
    fn test_treemap_hierarchy() {
        let table = table();
        let rows = all_rows(&table);
        let tree = treemap(&rows);

        let east = tree.iter().find(|r| r.region == "East").unwrap();
        assert_eq!(east.sales, 130.0);
        assert_eq!(east.categories.len(), 1);
        let furniture = &east.categories[0];
        assert_eq!(furniture.category, "Furniture");
        assert_eq!(furniture.sub_categories.len(), 2);

        // Phones appears under Technology in two regions and stays split
        let phone_regions: Vec<_> = tree
            .iter()
            .filter(|r| {
                r.categories
                    .iter()
                    .any(|c| c.sub_categories.iter().any(|s| s.sub_category == "Phones"))
            })
            .map(|r| r.region.as_str())
            .collect();
        assert_eq!(phone_regions, vec!["South", "West"]);
    }

    #[test]
    fn test_pivot_leaves_absent_combinations_null() {
        let table = table();
        let rows = all_rows(&table);
        let pivot = month_pivot(&rows);
        assert_eq!(pivot.months, vec!["January", "March"]);

        let chairs = pivot.rows.iter().find(|r| r.sub_category == "Chairs").unwrap();
        assert_eq!(chairs.cells, vec![Some(100.0), None]);
        let phones = pivot.rows.iter().find(|r| r.sub_category == "Phones").unwrap();
        assert_eq!(phones.cells, vec![Some(50.0), Some(20.0)]);
    }

    #[test]
    fn test_scatter_projection_per_row() {
        let table = table();
        let rows = all_rows(&table);
        let points = scatter_points(&rows);
        assert_eq!(points.len(), rows.len());
        assert_eq!(points[0].sales, 100.0);
        assert_eq!(points[2].profit, -3.0);
        assert_eq!(points[3].quantity, 4);
    }

    #[test]
    fn test_full_set_aggregates_sum_to_150() {
        let csv = "\
Order Date,Region,State,City,Segment,Category,Sub-Category,Sales,Profit,Quantity
2021-01-01,East,NY,NYC,Consumer,Furniture,Chairs,100,0,1
2021-02-01,West,CA,LA,Consumer,Furniture,Chairs,50,0,1
";
        let table = load_from_bytes(csv.as_bytes()).unwrap();
        let rows = all_rows(&table);
        let by_category: f64 = sales_by_category(&rows).iter().map(|t| t.sales).sum();
        let by_region: f64 = sales_by_region(&rows).iter().map(|t| t.sales).sum();
        assert_eq!(by_category, 150.0);
        assert_eq!(by_region, 150.0);
    }

    #[test]
    fn test_empty_rows_empty_aggregates() {
        let rows: Vec<&crate::data_structures::OrderRow> = Vec::new();
        assert!(sales_by_category(&rows).is_empty());
        assert!(sales_by_month(&rows).is_empty());
        assert!(treemap(&rows).is_empty());
        assert!(month_pivot(&rows).rows.is_empty());
        assert_eq!(total_sales(&rows), 0.0);
    }
}
