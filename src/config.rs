use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use tracing::{info, warn};
use zeroize::Zeroizing;

pub const PORT_VAR: &str = "SAFEHER_PORT";
pub const STORE_VAR: &str = "SAFEHER_STORE";
pub const DATA_DIR_VAR: &str = "SAFEHER_DATA_DIR";
pub const PASSPHRASE_VAR: &str = "SAFEHER_PASSPHRASE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("encrypted store needs SAFEHER_PASSPHRASE or /run/secrets/SAFEHER_PASSPHRASE")]
    MissingPassphrase,
    #[error("no data directory: set SAFEHER_DATA_DIR")]
    NoDataDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Encrypted,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "encrypted" => Ok(StoreBackend::Encrypted),
            other => Err(format!("unknown store backend {other:?}")),
        }
    }
}

pub enum StoreConfig {
    Memory,
    Encrypted {
        data_dir: PathBuf,
        passphrase: Zeroizing<String>,
    },
}

pub struct Config {
    pub port: u16,
    pub store: StoreConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok(), read_secret)
    }

    /// Build from arbitrary variable and secret sources.
    pub fn from_lookup(
        var: impl Fn(&str) -> Option<String>,
        secret: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let port = try_load(&var, PORT_VAR, "8080")?;
        let backend: StoreBackend = try_load(&var, STORE_VAR, "memory")?;

        let store = match backend {
            StoreBackend::Memory => StoreConfig::Memory,
            StoreBackend::Encrypted => {
                let data_dir = match var(DATA_DIR_VAR) {
                    Some(dir) => PathBuf::from(dir),
                    None => {
                        let dir = dirs::data_local_dir()
                            .ok_or(ConfigError::NoDataDir)?
                            .join("safeher");
                        info!("{} not set, using default: {}", DATA_DIR_VAR, dir.display());
                        dir
                    }
                };
                let passphrase = var(PASSPHRASE_VAR)
                    .or_else(|| secret(PASSPHRASE_VAR))
                    .filter(|p| !p.is_empty())
                    .ok_or(ConfigError::MissingPassphrase)?;
                StoreConfig::Encrypted {
                    data_dir,
                    passphrase: Zeroizing::new(passphrase),
                }
            }
        };

        Ok(Self { port, store })
    }
}

fn try_load<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }
    })
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn no_secret(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_to_memory_on_8080() {
        let config = Config::from_lookup(lookup(&[]), no_secret).unwrap();
        assert_eq!(config.port, 8080);
        assert!(matches!(config.store, StoreConfig::Memory));
    }

    #[test]
    fn bad_port_is_an_error() {
        let result = Config::from_lookup(lookup(&[(PORT_VAR, "eighty")]), no_secret);
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: PORT_VAR, .. })
        ));
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let result = Config::from_lookup(lookup(&[(STORE_VAR, "mongo")]), no_secret);
        assert!(matches!(result, Err(ConfigError::Invalid { key: STORE_VAR, .. })));
    }

    #[test]
    fn encrypted_store_requires_passphrase() {
        let vars = lookup(&[(STORE_VAR, "encrypted"), (DATA_DIR_VAR, "/tmp/safeher")]);
        let result = Config::from_lookup(vars, no_secret);
        assert!(matches!(result, Err(ConfigError::MissingPassphrase)));
    }

    #[test]
    fn passphrase_falls_back_to_secret_file() {
        let vars = lookup(&[(STORE_VAR, "Encrypted"), (DATA_DIR_VAR, "/tmp/safeher")]);
        let config = Config::from_lookup(vars, |_| Some("from-secret".to_string())).unwrap();

        match config.store {
            StoreConfig::Encrypted {
                data_dir,
                passphrase,
            } => {
                assert_eq!(data_dir, PathBuf::from("/tmp/safeher"));
                assert_eq!(passphrase.as_str(), "from-secret");
            }
            StoreConfig::Memory => panic!("expected encrypted store"),
        }
    }
}
