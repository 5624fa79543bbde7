//! Broker Client Factory
//!
//! Builds the shared `Arc<dyn BrokerClient>` a bot or tool runs against. Alpaca
//! needs a credential profile; Questrade needs a refresh token.

use crate::config::{AlpacaSettings, ConfigError, QuestradeSettings};
use crate::domain::entities::broker::Broker;
use crate::domain::repositories::broker_client::BrokerClient;
use crate::infrastructure::alpaca_client::AlpacaClient;
use crate::infrastructure::questrade_client::QuestradeClient;
use std::sync::Arc;
use tracing::{error, info};

pub struct BrokerClientFactory;

impl BrokerClientFactory {
    /// Create the client for `broker` from environment configuration
    pub fn create(broker: Broker, profile: &str) -> Result<Arc<dyn BrokerClient>, ConfigError> {
        match broker {
            Broker::Alpaca => {
                let settings = AlpacaSettings::from_env(profile)?;
                Ok(Self::alpaca(&settings))
            }
            Broker::Questrade => Self::questrade(&QuestradeSettings::from_env()),
        }
    }

    pub fn alpaca(settings: &AlpacaSettings) -> Arc<dyn BrokerClient> {
        let client = AlpacaClient::new(settings);
        info!("✓ {} client created", client.name());
        Arc::new(client)
    }

    pub fn questrade(settings: &QuestradeSettings) -> Result<Arc<dyn BrokerClient>, ConfigError> {
        if let Err(e) = settings.require_refresh_token() {
            error!("✗ Failed to create Questrade client: {}", e);
            return Err(e);
        }
        info!("✓ Questrade client created ({})", settings.api_base_url);
        Ok(Arc::new(QuestradeClient::new(settings)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_questrade_requires_refresh_token() {
        let empty: HashMap<&str, &str> = HashMap::new();
        let settings = QuestradeSettings::from_lookup(&|name: &str| {
            empty.get(name).map(|v| v.to_string())
        });
        assert!(matches!(
            BrokerClientFactory::questrade(&settings),
            Err(ConfigError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_alpaca_client_from_settings() {
        let vars: HashMap<&str, &str> =
            [("PAPER_API_KEY", "PKFACTORY"), ("PAPER_SECRET_KEY", "secret")]
                .into_iter()
                .collect();
        let settings =
            AlpacaSettings::from_lookup("", &|name: &str| vars.get(name).map(|v| v.to_string()))
                .unwrap();
        let client = BrokerClientFactory::alpaca(&settings);
        assert_eq!(client.name(), "Alpaca (PAPER)");
        assert_eq!(client.broker(), Broker::Alpaca);

        let settings = QuestradeSettings::from_lookup(&|name: &str| {
            (name == "QUESTRADE_REFRESH_TOKEN").then(|| "refresh".to_string())
        });
        let client = BrokerClientFactory::questrade(&settings).unwrap();
        assert_eq!(client.broker(), Broker::Questrade);
    }
}
