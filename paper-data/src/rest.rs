use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::DataError;

/// One `{last_price, close_price}` entry of the `GET /market-quote/quotes` response map (§6
/// "Broker REST (outbound)").
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponse {
    pub last_price: Decimal,
    pub close_price: Decimal,
}

/// One bar of a `GET /historical-candle/...` response array: `[timestampISO, open, high, low,
/// close, volume, oi]`, newest-first on the wire (§6). [`BrokerRestClient::historical_candles`]
/// reverses the order so callers receive oldest-first bars, matching the Candle Engine's
/// monotonic `openTime` convention.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalCandle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub open_interest: Decimal,
}

fn parse_candle_row(row: &[serde_json::Value]) -> Option<HistoricalCandle> {
    let timestamp = row.first()?.as_str()?.parse::<DateTime<Utc>>().ok()?;
    let get_decimal = |idx: usize| -> Decimal {
        row.get(idx)
            .and_then(|v| v.as_f64())
            .and_then(Decimal::from_f64_retain)
            .unwrap_or_default()
    };

    Some(HistoricalCandle {
        timestamp,
        open: get_decimal(1),
        high: get_decimal(2),
        low: get_decimal(3),
        close: get_decimal(4),
        volume: get_decimal(5),
        open_interest: get_decimal(6),
    })
}

/// Maximum number of retries on a transient (5xx) REST failure before giving up (§6 "Retries on
/// 5xx with exponential backoff").
const MAX_RETRIES: u32 = 3;

/// Outbound REST collaborator for the broker's quote snapshot and historical candle endpoints
/// (§6). The websocket feed is the primary tick source; this client backs one-shot reference
/// lookups (pre-trade risk fat-finger checks, chart backfill) that don't need the live stream.
pub struct BrokerRestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BrokerRestClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// `GET /market-quote/quotes?instrument_key=a,b,c` (§6), keyed by `instrumentKey` on return.
    /// Retries on 5xx with exponential backoff; a 401 is surfaced as [`DataError::UpstoxTokenMissing`]
    /// so the caller's auth layer can refresh the token and retry at a higher level.
    pub async fn quotes(
        &self,
        token: &str,
        instrument_keys: &[String],
    ) -> Result<HashMap<String, QuoteResponse>, DataError> {
        let joined = instrument_keys.join(",");
        let mut url = self
            .base_url
            .join("/market-quote/quotes")
            .map_err(|e| DataError::Internal(e.to_string()))?;
        url.query_pairs_mut().append_pair("instrument_key", &joined);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = self
                .http
                .get(url.clone())
                .bearer_auth(token)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status() == reqwest::StatusCode::UNAUTHORIZED => {
                    return Err(DataError::UpstoxTokenMissing);
                }
                Ok(resp) if resp.status().is_server_error() && attempt <= MAX_RETRIES => {
                    let delay = Duration::from_millis(200 * 2u64.pow(attempt - 1));
                    warn!(attempt, status = %resp.status(), "quote fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<HashMap<String, QuoteResponse>>()
                        .await
                        .map_err(|e| DataError::Internal(e.to_string()));
                }
                Ok(resp) => {
                    return Err(DataError::Internal(format!(
                        "quote fetch failed with status {}",
                        resp.status()
                    )));
                }
                Err(err) if attempt <= MAX_RETRIES => {
                    let delay = Duration::from_millis(200 * 2u64.pow(attempt - 1));
                    warn!(attempt, error = %err, "quote fetch transport error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(error = %err, "quote fetch exhausted retries");
                    return Err(DataError::UpstreamTimeout);
                }
            }
        }
    }

    /// `GET /historical-candle/...` (§6), returned oldest-first after reversing the wire's
    /// newest-first ordering.
    pub async fn historical_candles(
        &self,
        token: &str,
        path: &str,
    ) -> Result<Vec<HistoricalCandle>, DataError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| DataError::Internal(e.to_string()))?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "historical candle fetch failed");
                DataError::UpstreamTimeout
            })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DataError::UpstoxTokenMissing);
        }

        #[derive(Deserialize)]
        struct CandleEnvelope {
            data: CandleData,
        }
        #[derive(Deserialize)]
        struct CandleData {
            candles: Vec<Vec<serde_json::Value>>,
        }

        let envelope: CandleEnvelope = response
            .json()
            .await
            .map_err(|e| DataError::Internal(e.to_string()))?;

        let mut candles: Vec<HistoricalCandle> = envelope
            .data
            .candles
            .iter()
            .filter_map(|row| parse_candle_row(row))
            .collect();

        candles.reverse();
        debug!(count = candles.len(), "fetched historical candles");
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_candle_row() {
        let row = vec![
            serde_json::json!("2024-01-02T09:15:00+05:30"),
            serde_json::json!(100.0),
            serde_json::json!(105.0),
            serde_json::json!(99.0),
            serde_json::json!(102.0),
            serde_json::json!(1000.0),
            serde_json::json!(0.0),
        ];

        let candle = parse_candle_row(&row).unwrap();
        assert_eq!(candle.open, Decimal::from(100));
        assert_eq!(candle.high, Decimal::from(105));
        assert_eq!(candle.close, Decimal::from(102));
    }

    #[test]
    fn rejects_a_malformed_row_without_a_timestamp() {
        let row = vec![serde_json::json!(null)];
        assert!(parse_candle_row(&row).is_none());
    }
}
