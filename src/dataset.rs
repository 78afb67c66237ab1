use crate::data_structures::{OrderRow, SalesTable, TableSource};
use chrono::NaiveDate;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug)]
pub enum DatasetError {
    Io(std::io::Error),
    Csv(csv::Error),
    MissingColumn(String),
    BadRow { line: usize, message: String },
    UnsupportedFormat,
    Empty,
}

impl From<std::io::Error> for DatasetError {
    fn from(error: std::io::Error) -> Self {
        DatasetError::Io(error)
    }
}

impl From<csv::Error> for DatasetError {
    fn from(error: csv::Error) -> Self {
        DatasetError::Csv(error)
    }
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetError::Io(e) => write!(f, "failed to read dataset: {e}"),
            DatasetError::Csv(e) => write!(f, "failed to parse dataset: {e}"),
            DatasetError::MissingColumn(name) => {
                write!(f, "required column '{name}' is missing from the dataset")
            }
            DatasetError::BadRow { line, message } => {
                write!(f, "bad value on dataset row {line}: {message}")
            }
            DatasetError::UnsupportedFormat => {
                write!(f, "Excel workbooks are not supported; export the sheet as CSV first")
            }
            DatasetError::Empty => write!(f, "dataset contains no rows"),
        }
    }
}

impl std::error::Error for DatasetError {}

// Columns the dashboard cannot render without, after normalization
pub const REQUIRED_COLUMNS: [&str; 10] = [
    "order date",
    "sales",
    "category",
    "sub-category",
    "region",
    "state",
    "city",
    "segment",
    "profit",
    "quantity",
];

const DATE_FORMATS: [&str; 3] = ["%m/%d/%Y", "%Y-%m-%d", "%d-%m-%Y"];

/// Load the fallback dataset from disk.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<SalesTable, DatasetError> {
    let bytes = fs::read(path.as_ref())?;
    let mut table = load_from_bytes(&bytes)?;
    table.source = TableSource::Fallback;
    Ok(table)
}

/// Load a dataset from raw bytes (file upload). The Superstore export is
/// ISO-8859-1, so decode latin-1 before handing the text to the CSV reader.
pub fn load_from_bytes(bytes: &[u8]) -> Result<SalesTable, DatasetError> {
    // xlsx is a zip archive, xls an OLE compound file; neither is parseable
    // here, so reject them up front instead of reporting a missing column
    if bytes.starts_with(&[0x50, 0x4B, 0x03, 0x04]) || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0])
    {
        return Err(DatasetError::UnsupportedFormat);
    }

    let content = decode_latin1(bytes);
    parse_csv(&content)
}

/// Latin-1 maps each byte to the Unicode code point of the same value, so a
/// plain-ASCII file round-trips unchanged.
fn decode_latin1(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

fn parse_order_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

fn field<'r>(
    record: &'r csv::StringRecord,
    idx: usize,
    line: usize,
) -> Result<&'r str, DatasetError> {
    record.get(idx).ok_or_else(|| DatasetError::BadRow {
        line,
        message: format!("row has only {} fields", record.len()),
    })
}

fn parse_number(
    record: &csv::StringRecord,
    idx: usize,
    line: usize,
    name: &str,
) -> Result<f64, DatasetError> {
    let value = field(record, idx, line)?;
    value.trim().parse().map_err(|_| DatasetError::BadRow {
        line,
        message: format!("cannot parse {name} '{value}' as a number"),
    })
}

fn parse_csv(content: &str) -> Result<SalesTable, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(normalize_header)
        .collect();

    let column_index = |name: &str| -> Result<usize, DatasetError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DatasetError::MissingColumn(name.to_string()))
    };

    for required in REQUIRED_COLUMNS {
        column_index(required)?;
    }

    let date_idx = column_index("order date")?;
    let region_idx = column_index("region")?;
    let state_idx = column_index("state")?;
    let city_idx = column_index("city")?;
    let segment_idx = column_index("segment")?;
    let category_idx = column_index("category")?;
    let sub_category_idx = column_index("sub-category")?;
    let sales_idx = column_index("sales")?;
    let profit_idx = column_index("profit")?;
    let quantity_idx = column_index("quantity")?;

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        // Header is line 1, so data rows start at line 2
        let line = i + 2;

        let date_value = field(&record, date_idx, line)?;
        let order_date = parse_order_date(date_value).ok_or_else(|| DatasetError::BadRow {
            line,
            message: format!("cannot parse order date '{date_value}'"),
        })?;

        let quantity_value = field(&record, quantity_idx, line)?;
        let quantity: u64 = quantity_value.trim().parse().map_err(|_| DatasetError::BadRow {
            line,
            message: format!("cannot parse quantity '{quantity_value}' as a non-negative integer"),
        })?;

        rows.push(OrderRow {
            order_date,
            region: field(&record, region_idx, line)?.trim().to_string(),
            state: field(&record, state_idx, line)?.trim().to_string(),
            city: field(&record, city_idx, line)?.trim().to_string(),
            segment: field(&record, segment_idx, line)?.trim().to_string(),
            category: field(&record, category_idx, line)?.trim().to_string(),
            sub_category: field(&record, sub_category_idx, line)?.trim().to_string(),
            sales: parse_number(&record, sales_idx, line, "sales")?,
            profit: parse_number(&record, profit_idx, line, "profit")?,
            quantity,
            raw: record.iter().map(str::to_string).collect(),
        });
    }

    if rows.is_empty() {
        return Err(DatasetError::Empty);
    }

    let min_date = rows.iter().map(|r| r.order_date).min();
    let max_date = rows.iter().map(|r| r.order_date).max();

    Ok(SalesTable {
        headers,
        rows,
        min_date,
        max_date,
        source: TableSource::Upload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Order Date,Region,State,City,Segment,Category,Sub-Category,Sales,Profit,Quantity
01/05/2021,East,New York,Buffalo,Consumer,Furniture,Chairs,100.5,20.0,2
02/10/2021,West,California,Fresno,Corporate,Technology,Phones,50.25,-5.5,1
";

    #[test]
    fn test_loads_and_normalizes_headers() {
        let table = load_from_bytes(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.headers[0], "order date");
        assert_eq!(table.headers[6], "sub-category");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].region, "East");
        assert_eq!(table.rows[0].order_date, NaiveDate::from_ymd_opt(2021, 1, 5).unwrap());
        assert_eq!(table.min_date, NaiveDate::from_ymd_opt(2021, 1, 5));
        assert_eq!(table.max_date, NaiveDate::from_ymd_opt(2021, 2, 10));
    }

    #[test]
    fn test_header_whitespace_and_case() {
        let csv = SAMPLE.replace("Order Date", "  ORDER DATE  ");
        let table = load_from_bytes(csv.as_bytes()).unwrap();
        assert_eq!(table.headers[0], "order date");
    }

    #[test]
    fn test_missing_required_column() {
        let csv = "\
Order Date,Region,State,City,Segment,Category,Sub-Category,Profit,Quantity
01/05/2021,East,New York,Buffalo,Consumer,Furniture,Chairs,20.0,2
";
        let err = load_from_bytes(csv.as_bytes()).unwrap_err();
        match err {
            DatasetError::MissingColumn(name) => assert_eq!(name, "sales"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_latin1_bytes_decode() {
        let mut bytes = SAMPLE.as_bytes().to_vec();
        // 0xE9 is 'é' in latin-1 and invalid on its own in UTF-8
        let pos = SAMPLE.find("Fresno").unwrap();
        bytes[pos] = 0xE9;
        let table = load_from_bytes(&bytes).unwrap();
        assert!(table.rows[1].city.starts_with('é'));
    }

    #[test]
    fn test_iso_date_format_accepted() {
        let csv = SAMPLE.replace("01/05/2021", "2021-01-05");
        let table = load_from_bytes(csv.as_bytes()).unwrap();
        assert_eq!(table.rows[0].order_date, NaiveDate::from_ymd_opt(2021, 1, 5).unwrap());
    }

    #[test]
    fn test_bad_sales_value_names_row() {
        let csv = SAMPLE.replace("100.5", "n/a");
        let err = load_from_bytes(csv.as_bytes()).unwrap_err();
        match err {
            DatasetError::BadRow { line, .. } => assert_eq!(line, 2),
            other => panic!("expected BadRow, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_quantity_names_row() {
        let csv = SAMPLE.replace(",1\n", ",-1\n");
        match load_from_bytes(csv.as_bytes()).unwrap_err() {
            DatasetError::BadRow { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("quantity"));
            }
            other => panic!("expected BadRow, got {other:?}"),
        }
    }

    #[test]
    fn test_fractional_quantity_rejected() {
        let csv = SAMPLE.replace(",2\n", ",2.5\n");
        match load_from_bytes(csv.as_bytes()).unwrap_err() {
            DatasetError::BadRow { line, .. } => assert_eq!(line, 2),
            other => panic!("expected BadRow, got {other:?}"),
        }
    }

    #[test]
    fn test_excel_upload_rejected() {
        let xlsx_header = [0x50, 0x4B, 0x03, 0x04, 0x14, 0x00];
        assert!(matches!(
            load_from_bytes(&xlsx_header),
            Err(DatasetError::UnsupportedFormat)
        ));
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let csv = "Order Date,Region,State,City,Segment,Category,Sub-Category,Sales,Profit,Quantity\n";
        assert!(matches!(load_from_bytes(csv.as_bytes()), Err(DatasetError::Empty)));
    }

    #[test]
    fn test_raw_record_preserved() {
        let table = load_from_bytes(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.rows[0].raw.len(), table.headers.len());
        assert_eq!(table.rows[0].raw[7], "100.5");
    }
}
