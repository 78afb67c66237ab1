use crate::data_structures::{FilterState, OrderRow, SalesTable};

/// Apply a filter state to the table, preserving source row order.
///
/// A row survives iff its order date falls inside the inclusive range and
/// every non-empty selection contains the row's value for that column. The
/// three selections are independent conjunctive constraints; picking a region
/// never narrows which states or cities may match.
pub fn apply<'a>(table: &'a SalesTable, filter: &FilterState) -> Vec<&'a OrderRow> {
    let Some((start, end)) = resolve_range(table, filter) else {
        return Vec::new();
    };

    table
        .rows
        .iter()
        .filter(|row| {
            row.order_date >= start
                && row.order_date <= end
                && selection_allows(&filter.regions, &row.region)
                && selection_allows(&filter.states, &row.state)
                && selection_allows(&filter.cities, &row.city)
        })
        .collect()
}

/// Missing bounds default to the table's min/max order date, the same way the
/// dashboard's date pickers default to the dataset's extent.
fn resolve_range(
    table: &SalesTable,
    filter: &FilterState,
) -> Option<(chrono::NaiveDate, chrono::NaiveDate)> {
    let start = filter.start.or(table.min_date)?;
    let end = filter.end.or(table.max_date)?;
    Some((start, end))
}

fn selection_allows(selection: &[String], value: &str) -> bool {
    selection.is_empty() || selection.iter().any(|s| s == value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::load_from_bytes;
    use chrono::NaiveDate;

    fn table() -> SalesTable {
        let csv = "\
Order Date,Region,State,City,Segment,Category,Sub-Category,Sales,Profit,Quantity
01/01/2021,East,New York,Buffalo,Consumer,Furniture,Chairs,100,10,1
02/01/2021,West,California,Fresno,Consumer,Technology,Phones,50,5,1
03/15/2021,East,New York,Albany,Corporate,Furniture,Tables,25,2,1
06/30/2021,South,Texas,Austin,Consumer,Office Supplies,Paper,10,1,1
";
        load_from_bytes(csv.as_bytes()).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_inclusive_both_ends() {
        let table = table();
        let filter = FilterState {
            start: Some(date(2021, 2, 1)),
            end: Some(date(2021, 3, 15)),
            ..Default::default()
        };
        let rows = apply(&table, &filter);
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert!(row.order_date >= date(2021, 2, 1));
            assert!(row.order_date <= date(2021, 3, 15));
        }
    }

    #[test]
    fn test_empty_selections_pass_all_rows_in_range() {
        let table = table();
        let rows = apply(&table, &FilterState::default());
        assert_eq!(rows.len(), table.rows.len());
    }

    #[test]
    fn test_nonempty_selection_constrains_membership() {
        let table = table();
        let filter = FilterState {
            regions: vec!["East".to_string()],
            ..Default::default()
        };
        let rows = apply(&table, &filter);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.region == "East"));
    }

    #[test]
    fn test_selections_are_conjunctive_not_cascading() {
        let table = table();
        // A region pick combined with a state outside that region matches nothing
        let filter = FilterState {
            regions: vec!["East".to_string()],
            states: vec!["California".to_string()],
            ..Default::default()
        };
        assert!(apply(&table, &filter).is_empty());
    }

    #[test]
    fn test_row_order_preserved() {
        let table = table();
        let filter = FilterState {
            regions: vec!["East".to_string(), "South".to_string()],
            ..Default::default()
        };
        let rows = apply(&table, &filter);
        let dates: Vec<_> = rows.iter().map(|r| r.order_date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let table = table();
        let filter = FilterState {
            start: Some(date(2021, 1, 1)),
            end: Some(date(2021, 6, 30)),
            regions: vec!["East".to_string()],
            ..Default::default()
        };
        let first = apply(&table, &filter);
        let second = apply(&table, &filter);
        assert_eq!(first, second);
    }

    #[test]
    fn test_region_selection_worked_example() {
        let csv = "\
Order Date,Region,State,City,Segment,Category,Sub-Category,Sales,Profit,Quantity
2021-01-01,East,NY,NYC,Consumer,Furniture,Chairs,100,0,1
2021-02-01,West,CA,LA,Consumer,Furniture,Chairs,50,0,1
";
        let table = load_from_bytes(csv.as_bytes()).unwrap();
        let filter = FilterState {
            regions: vec!["East".to_string()],
            ..Default::default()
        };
        let rows = apply(&table, &filter);
        let sum: f64 = rows.iter().map(|r| r.sales).sum();
        assert_eq!(sum, 100.0);
    }

    #[test]
    fn test_empty_table_yields_nothing() {
        let table = SalesTable::empty();
        assert!(apply(&table, &FilterState::default()).is_empty());
    }
}
