use serde::Deserialize;
use std::{env, time::Duration};

const DEFAULT_CONFIG_FILE: &str = "phishlens.toml";
const ENV_PREFIX: &str = "PHISHLENS";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub fetch: FetchConfig,
    pub whois: WhoisConfig,
    pub dns: DnsConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/classifier.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_body_bytes: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_body_bytes: 5 * 1024 * 1024,
            user_agent: concat!("phishlens-engine/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhoisConfig {
    pub timeout_secs: u64,
    /// Referral server used for TLDs missing from the built-in table.
    pub iana_server: String,
    /// Full public suffix list on disk. The bundled excerpt is used when unset.
    pub suffix_list_path: Option<String>,
}

impl Default for WhoisConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            iana_server: "whois.iana.org:43".to_string(),
            suffix_list_path: None,
        }
    }
}

impl WhoisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    pub timeout_secs: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

impl DnsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub no_results_marker: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://www.google.com/search".to_string(),
            no_results_marker: "did not match any documents".to_string(),
            timeout_secs: 5,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
}

impl Config {
    /// Layers defaults, an optional TOML file and `PHISHLENS__*` env vars.
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = env::var("PHISHLENS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.fetch.timeout(), Duration::from_secs(10));
        assert_eq!(config.search.timeout(), Duration::from_secs(5));
        assert_eq!(config.model.path, "models/classifier.json");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                "[fetch]\ntimeout_secs = 3\n\n[server]\nbind_addr = \"127.0.0.1:9000\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.fetch.timeout_secs, 3);
        assert_eq!(config.fetch.max_body_bytes, 5 * 1024 * 1024);
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.whois.iana_server, "whois.iana.org:43");
    }
}
