//! Broker REST clients and the OAuth callback server

pub mod alpaca_client;
pub mod broker_client_factory;
pub mod oauth_callback;
pub mod questrade_client;

use crate::domain::repositories::broker_client::{BrokerError, BrokerResult};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Deserializer};

impl From<reqwest::Error> for BrokerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BrokerError::Decode(e.to_string())
        } else {
            BrokerError::Http(e.to_string())
        }
    }
}

/// Map a non-success HTTP status and body to a `BrokerError`
pub(crate) fn error_from_status(status: StatusCode, body: String) -> BrokerError {
    match status {
        StatusCode::UNAUTHORIZED => BrokerError::Unauthorized(body),
        StatusCode::FORBIDDEN => BrokerError::Forbidden { body },
        StatusCode::NOT_FOUND => BrokerError::NotFound(body),
        other => BrokerError::Api {
            status: other.as_u16(),
            body,
        },
    }
}

/// Pass successful responses through, turn the rest into errors
pub(crate) async fn ensure_success(response: Response) -> BrokerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_from_status(status, body))
}

/// Brokers send decimals as strings (`"12.5"`) or as numbers; accept both
pub(crate) fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

pub(crate) fn optional_number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Null,
    }

    match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(Raw::Null) | None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "number_or_string")]
        qty: f64,
        #[serde(default, deserialize_with = "optional_number_or_string")]
        price: Option<f64>,
    }

    #[test]
    fn test_error_from_status() {
        assert!(matches!(
            error_from_status(StatusCode::UNAUTHORIZED, "bad key".into()),
            BrokerError::Unauthorized(_)
        ));
        assert!(matches!(
            error_from_status(StatusCode::FORBIDDEN, "EU tax resident".into()),
            BrokerError::Forbidden { .. }
        ));
        assert!(matches!(
            error_from_status(StatusCode::NOT_FOUND, String::new()),
            BrokerError::NotFound(_)
        ));
        assert!(matches!(
            error_from_status(StatusCode::UNPROCESSABLE_ENTITY, "qty".into()),
            BrokerError::Api { status: 422, .. }
        ));
    }

    #[test]
    fn test_number_or_string() {
        let sample: Sample = serde_json::from_str(r#"{"qty": "12.5", "price": 3}"#).unwrap();
        assert_eq!(sample.qty, 12.5);
        assert_eq!(sample.price, Some(3.0));

        let sample: Sample = serde_json::from_str(r#"{"qty": 2, "price": null}"#).unwrap();
        assert_eq!(sample.qty, 2.0);
        assert_eq!(sample.price, None);

        let sample: Sample = serde_json::from_str(r#"{"qty": 1}"#).unwrap();
        assert_eq!(sample.price, None);

        assert!(serde_json::from_str::<Sample>(r#"{"qty": "abc"}"#).is_err());
    }
}
