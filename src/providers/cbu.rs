use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::currency::Currency;
use crate::core::rates::{RateSource, RateTable};

const RATES_PATH: &str = "/uz/arkhiv-kursov-valyut/json/";

// Central Bank of Uzbekistan daily rate list
pub struct CbuRateSource {
    base_url: String,
    timeout: Duration,
}

impl CbuRateSource {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        CbuRateSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CbuRecord {
    #[serde(rename = "Ccy", default)]
    code: String,
    #[serde(rename = "Rate", default)]
    rate: serde_json::Value,
    #[serde(rename = "Nominal", default)]
    nominal: Option<serde_json::Value>,
}

fn parse_number(value: &serde_json::Value) -> Option<f64> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (number.is_finite() && number > 0.0).then_some(number)
}

impl CbuRecord {
    /// Supported currency and its base-currency price for a single unit.
    fn to_entry(&self) -> Option<(Currency, f64)> {
        let currency = Currency::from_str(&self.code).ok()?;
        if currency.is_base() {
            return None;
        }
        let rate = match parse_number(&self.rate) {
            Some(rate) => rate,
            None => {
                debug!(code = %self.code, rate = %self.rate, "Skipping record with bad rate");
                return None;
            }
        };
        let nominal = match &self.nominal {
            Some(value) => parse_number(value)?,
            None => 1.0,
        };
        Some((currency, rate / nominal))
    }
}

#[async_trait]
impl RateSource for CbuRateSource {
    #[instrument(name = "CbuRateFetch", skip(self), fields(base_url = %self.base_url))]
    async fn fetch(&self) -> Result<RateTable> {
        let url = format!("{}{}", self.base_url, RATES_PATH);
        debug!("Requesting rates from {}", url);

        let client = reqwest::Client::builder()
            .user_agent("kurs/1.0")
            .timeout(self.timeout)
            .build()?;
        let response = client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} URL: {}", e, url))?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} for URL: {}", response.status(), url));
        }

        let text = response.text().await?;
        let records: Vec<CbuRecord> = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse CBU rate list: {}", e))?;
        debug!(records = records.len(), "Received CBU response");

        let table = RateTable::new(records.iter().filter_map(CbuRecord::to_entry));
        if table.is_empty() {
            return Err(anyhow!("No supported currency rates in CBU response"));
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn create_mock_server(status: u16, mock_response: &str) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(RATES_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn source(server: &MockServer) -> CbuRateSource {
        CbuRateSource::new(&server.uri(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_successful_rate_fetch() {
        let mock_response = r#"[
            {"id": 69, "Code": "840", "Ccy": "USD", "Nominal": "1", "Rate": "12700.50", "Date": "10.03.2024"},
            {"id": 21, "Code": "978", "Ccy": "EUR", "Nominal": "1", "Rate": "13600", "Date": "10.03.2024"},
            {"id": 57, "Code": "643", "Ccy": "RUB", "Nominal": "1", "Rate": "140.37", "Date": "10.03.2024"},
            {"id": 31, "Code": "410", "Ccy": "KRW", "Nominal": "10", "Rate": "95.20", "Date": "10.03.2024"},
            {"id": 12, "Code": "036", "Ccy": "AUD", "Nominal": "1", "Rate": "8300.10", "Date": "10.03.2024"}
        ]"#;
        let server = create_mock_server(200, mock_response).await;

        let table = source(&server).fetch().await.unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.get(Currency::Usd), Some(12700.5));
        assert_eq!(table.get(Currency::Eur), Some(13600.0));
        assert_eq!(table.get(Currency::Rub), Some(140.37));
        assert!((table.get(Currency::Krw).unwrap() - 9.52).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_bad_record_is_skipped() {
        let mock_response = r#"[
            {"Ccy": "USD", "Nominal": "1", "Rate": "not-a-number"},
            {"Ccy": "EUR", "Nominal": "1", "Rate": "13600.00"},
            {"Ccy": "GBP", "Nominal": "0", "Rate": "16000.00"},
            {"Ccy": "RUB"},
            {"Rate": "1.0"}
        ]"#;
        let server = create_mock_server(200, mock_response).await;

        let table = source(&server).fetch().await.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(Currency::Eur), Some(13600.0));
        assert_eq!(table.get(Currency::Usd), None);
    }

    #[tokio::test]
    async fn test_no_supported_rates_is_an_error() {
        let mock_response = r#"[{"Ccy": "AUD", "Nominal": "1", "Rate": "8300.10"}]"#;
        let server = create_mock_server(200, mock_response).await;

        let result = source(&server).fetch().await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "No supported currency rates in CBU response"
        );
    }

    #[tokio::test]
    async fn test_http_error_response() {
        let server = create_mock_server(500, "").await;

        let result = source(&server).fetch().await;
        assert!(
            result
                .unwrap_err()
                .to_string()
                .starts_with("HTTP error: 500 Internal Server Error")
        );
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let server = create_mock_server(200, r#"{"rates": []}"#).await;

        let result = source(&server).fetch().await;
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse CBU rate list")
        );
    }
}
