use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8780;
const DEFAULT_DATASET_PATH: &str = "data/Superstore.csv";
const DEFAULT_PROVIDER_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_SYMBOL: &str = "GOOGL";
// The stock page's original date-picker defaults
const DEFAULT_STOCK_START: &str = "2010-05-31";
const DEFAULT_STOCK_END: &str = "2020-05-31";

// YAML-serializable configuration structure
#[derive(Serialize, Deserialize, Debug)]
pub struct ConfigYaml {
    pub node_name: String,
    pub port: u16,
    pub dataset_path: String,
    pub reload_interval_secs: Option<u64>,
    pub provider_base_url: Option<String>,
    pub default_symbol: Option<String>,
    pub default_stock_start: Option<NaiveDate>,
    pub default_stock_end: Option<NaiveDate>,
    pub environment: String,
}

// Holds application-wide settings
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub node_name: String,
    pub port: u16,
    pub dataset_path: String,
    pub reload_interval: Duration,
    pub provider_base_url: String,
    pub default_symbol: String,
    pub default_stock_start: NaiveDate,
    pub default_stock_end: NaiveDate,
    pub environment: String,
}

impl AppConfig {
    // Load configuration from YAML file or environment variables
    pub fn load() -> Self {
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            Self::from_yaml(&config_file)
        } else {
            Self::from_env()
        }
    }

    pub fn from_yaml(file_path: &str) -> Self {
        let yaml_content = fs::read_to_string(file_path)
            .unwrap_or_else(|e| panic!("Failed to read config file {}: {}", file_path, e));

        let yaml_config: ConfigYaml = serde_yaml::from_str(&yaml_content)
            .unwrap_or_else(|e| panic!("Failed to parse YAML config: {}", e));

        Self {
            node_name: yaml_config.node_name,
            port: yaml_config.port,
            dataset_path: yaml_config.dataset_path,
            reload_interval: Duration::from_secs(yaml_config.reload_interval_secs.unwrap_or(300)),
            provider_base_url: yaml_config
                .provider_base_url
                .unwrap_or_else(|| DEFAULT_PROVIDER_BASE_URL.to_string()),
            default_symbol: yaml_config
                .default_symbol
                .unwrap_or_else(|| DEFAULT_SYMBOL.to_string()),
            default_stock_start: yaml_config
                .default_stock_start
                .unwrap_or_else(|| parse_default_date(DEFAULT_STOCK_START)),
            default_stock_end: yaml_config
                .default_stock_end
                .unwrap_or_else(|| parse_default_date(DEFAULT_STOCK_END)),
            environment: yaml_config.environment,
        }
    }

    // Load all configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if present

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let dataset_path =
            env::var("DATASET_PATH").unwrap_or_else(|_| DEFAULT_DATASET_PATH.to_string());

        let reload_interval_secs = env::var("RELOAD_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300); // Default to 5 minutes

        let provider_base_url = env::var("PROVIDER_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_PROVIDER_BASE_URL.to_string());

        let default_symbol =
            env::var("DEFAULT_SYMBOL").unwrap_or_else(|_| DEFAULT_SYMBOL.to_string());

        let default_stock_start = env::var("DEFAULT_STOCK_START")
            .map(|s| parse_default_date(&s))
            .unwrap_or_else(|_| parse_default_date(DEFAULT_STOCK_START));

        let default_stock_end = env::var("DEFAULT_STOCK_END")
            .map(|s| parse_default_date(&s))
            .unwrap_or_else(|_| parse_default_date(DEFAULT_STOCK_END));

        let environment =
            env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let node_name = env::var("NODE_NAME").unwrap_or_else(|_| "superstore-dash".to_string());

        Self {
            node_name,
            port,
            dataset_path,
            reload_interval: Duration::from_secs(reload_interval_secs),
            provider_base_url,
            default_symbol,
            default_stock_start,
            default_stock_end,
            environment,
        }
    }
}

fn parse_default_date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .unwrap_or_else(|e| panic!("Invalid date '{}' in configuration: {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_config_defaults() {
        let yaml = "\
node_name: test-node
port: 9000
dataset_path: /tmp/data.csv
environment: development
";
        let parsed: ConfigYaml = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.port, 9000);
        assert!(parsed.provider_base_url.is_none());
        assert!(parsed.default_stock_start.is_none());
    }

    #[test]
    fn test_yaml_config_full() {
        let yaml = "\
node_name: test-node
port: 9000
dataset_path: /tmp/data.csv
reload_interval_secs: 60
provider_base_url: http://localhost:9999
default_symbol: MSFT
default_stock_start: 2015-01-01
default_stock_end: 2020-01-01
environment: production
";
        let parsed: ConfigYaml = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.default_symbol.as_deref(), Some("MSFT"));
        assert_eq!(
            parsed.default_stock_start,
            NaiveDate::from_ymd_opt(2015, 1, 1)
        );
    }

    #[test]
    fn test_parse_default_date() {
        assert_eq!(
            parse_default_date("2010-05-31"),
            NaiveDate::from_ymd_opt(2010, 5, 31).unwrap()
        );
    }
}
