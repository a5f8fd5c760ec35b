use crate::error::{Error, Result};
use crate::models::estimate::EstimateLevel;
use crate::utils::units::FiatRate;
use config::{Config, ConfigError, Environment, Source};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use url::Url;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ethereum_rpc_urls: Vec<Url>,
    pub cache_duration: Duration,
    pub poll_interval: Duration,
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub minimum_gas_limit: u64,
    pub maximum_gas_limit: u64,
    pub default_estimate_level: EstimateLevel,
    pub advanced_gas_preferred: bool,
    pub fiat_currency: String,
    pub fiat_conversion_rate: Option<FiatRate>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv::dotenv();
        Self::load(Environment::default())
    }

    /// Reads the configuration from `source` on top of the defaults.
    pub fn load<S>(source: S) -> Result<Self>
    where
        S: Source + Send + Sync + 'static,
    {
        let settings = Config::builder()
            .set_default("cache_duration_seconds", 0)?
            .set_default("poll_interval_ms", 10_000)?
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8080)?
            .set_default("log_level", "info")?
            .set_default("minimum_gas_limit", 21_000)?
            .set_default("maximum_gas_limit", 7_920_027)?
            .set_default("default_estimate_level", "medium")?
            .set_default("advanced_gas_preferred", false)?
            .set_default("fiat_currency", "usd")?
            .add_source(source)
            .build()?;

        let ethereum_rpc_urls = match settings.get_string("ethereum_rpc_urls") {
            Ok(val) => parse_rpc_urls(&val)?,
            Err(ConfigError::NotFound(_)) => {
                return Err(Error::Config("No Ethereum RPC URLs provided".into()));
            }
            Err(e) => return Err(e.into()),
        };

        let host = settings
            .get_string("host")?
            .parse::<IpAddr>()
            .map_err(|_| Error::Config("Invalid HOST".into()))?;

        let minimum_gas_limit = settings.get::<u64>("minimum_gas_limit")?;
        let maximum_gas_limit = settings.get::<u64>("maximum_gas_limit")?;
        if minimum_gas_limit > maximum_gas_limit {
            return Err(Error::Config(format!(
                "MINIMUM_GAS_LIMIT {} exceeds MAXIMUM_GAS_LIMIT {}",
                minimum_gas_limit, maximum_gas_limit
            )));
        }

        let default_estimate_level = settings
            .get_string("default_estimate_level")?
            .parse::<EstimateLevel>()
            .ok()
            .filter(|level| EstimateLevel::NETWORK.contains(level))
            .ok_or_else(|| {
                Error::Config("DEFAULT_ESTIMATE_LEVEL must be low, medium or high".into())
            })?;

        let fiat_conversion_rate = match settings.get_string("fiat_conversion_rate") {
            Ok(rate) => Some(
                rate.parse::<FiatRate>()
                    .map_err(|e| Error::Config(format!("Invalid FIAT_CONVERSION_RATE: {}", e)))?,
            ),
            Err(ConfigError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            ethereum_rpc_urls,
            cache_duration: Duration::from_secs(settings.get::<u64>("cache_duration_seconds")?),
            poll_interval: Duration::from_millis(settings.get::<u64>("poll_interval_ms")?),
            host,
            port: settings
                .get::<u16>("port")
                .map_err(|_| Error::Config("Invalid PORT".into()))?,
            log_level: settings.get_string("log_level")?,
            minimum_gas_limit,
            maximum_gas_limit,
            default_estimate_level,
            advanced_gas_preferred: settings.get_bool("advanced_gas_preferred")?,
            fiat_currency: settings.get_string("fiat_currency")?.to_lowercase(),
            fiat_conversion_rate,
        })
    }

    pub fn server_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_rpc_urls(input: &str) -> Result<Vec<Url>> {
    let urls = input
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(|url| {
            let parsed =
                Url::parse(url).map_err(|e| Error::Config(format!("Not valid url {}: {}", url, e)))?;
            match parsed.scheme() {
                "http" | "https" => Ok(parsed),
                scheme => Err(Error::Config(format!(
                    "Unsupported RPC scheme {} in {}",
                    scheme, url
                ))),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    if urls.is_empty() {
        return Err(Error::Config("No Ethereum RPC URLs provided".into()));
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn source(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Environment::default().source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::load(source(&[("ETHEREUM_RPC_URLS", "http://localhost:8545")]))
            .unwrap();

        assert_eq!(config.ethereum_rpc_urls.len(), 1);
        assert_eq!(config.cache_duration, Duration::ZERO);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.port, 8080);
        assert_eq!(config.minimum_gas_limit, 21_000);
        assert_eq!(config.maximum_gas_limit, 7_920_027);
        assert_eq!(config.default_estimate_level, EstimateLevel::Medium);
        assert!(!config.advanced_gas_preferred);
        assert_eq!(config.fiat_currency, "usd");
        assert!(config.fiat_conversion_rate.is_none());
        assert_eq!(config.server_address().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::load(source(&[
            ("ETHEREUM_RPC_URLS", "https://a.example, https://b.example"),
            ("PORT", "9000"),
            ("POLL_INTERVAL_MS", "2500"),
            ("DEFAULT_ESTIMATE_LEVEL", "high"),
            ("ADVANCED_GAS_PREFERRED", "true"),
            ("FIAT_CURRENCY", "EUR"),
            ("FIAT_CONVERSION_RATE", "1834.25"),
        ]))
        .unwrap();

        assert_eq!(config.ethereum_rpc_urls.len(), 2);
        assert_eq!(config.port, 9000);
        assert_eq!(config.poll_interval, Duration::from_millis(2500));
        assert_eq!(config.default_estimate_level, EstimateLevel::High);
        assert!(config.advanced_gas_preferred);
        assert_eq!(config.fiat_currency, "eur");
        assert!(config.fiat_conversion_rate.is_some());
    }

    #[test]
    fn test_missing_rpc_url() {
        assert_matches!(AppConfig::load(source(&[])), Err(Error::Config(msg)) if msg.contains("RPC"));
        assert_matches!(
            AppConfig::load(source(&[("ETHEREUM_RPC_URLS", " , ")])),
            Err(Error::Config(_))
        );
    }

    #[test]
    fn test_invalid_values() {
        assert_matches!(
            AppConfig::load(source(&[("ETHEREUM_RPC_URLS", "ws://localhost:8546")])),
            Err(Error::Config(msg)) if msg.contains("scheme")
        );
        assert_matches!(
            AppConfig::load(source(&[
                ("ETHEREUM_RPC_URLS", "http://localhost:8545"),
                ("DEFAULT_ESTIMATE_LEVEL", "custom"),
            ])),
            Err(Error::Config(_))
        );
        assert_matches!(
            AppConfig::load(source(&[
                ("ETHEREUM_RPC_URLS", "http://localhost:8545"),
                ("MINIMUM_GAS_LIMIT", "30000"),
                ("MAXIMUM_GAS_LIMIT", "21000"),
            ])),
            Err(Error::Config(_))
        );
    }
}
