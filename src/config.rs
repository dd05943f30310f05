use dotenv::dotenv;
use std::{env, path::PathBuf};
use thiserror::Error;

const DEFAULT_ORIGINS: [&str; 4] = [
    "https://thepante.github.io",
    "http://localhost:3000",
    "http://localhost:5500",
    "http://localhost:8080",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid PORT value {0:?}")]
    InvalidPort(String),

    #[error("invalid origin {0:?} in ALLOWED_ORIGINS")]
    InvalidOrigin(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub redirect_url: String,
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            data_dir: PathBuf::from("./db"),
            redirect_url: "https://github.com/thepante".to_string(),
            allowed_origins: DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect(),
        }
    }
}

impl AppConfig {
    pub fn init() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            None => defaults.port,
        };

        let allowed_origins = match lookup("ALLOWED_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(|origin| {
                    if origin.starts_with("http://") || origin.starts_with("https://") {
                        Ok(origin.trim_end_matches('/').to_string())
                    } else {
                        Err(ConfigError::InvalidOrigin(origin.to_string()))
                    }
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.allowed_origins,
        };

        Ok(AppConfig {
            host: lookup("HOST").unwrap_or(defaults.host),
            port,
            data_dir: lookup("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            redirect_url: lookup("REDIRECT_URL").unwrap_or(defaults.redirect_url),
            allowed_origins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.data_dir, PathBuf::from("./db"));
        assert_eq!(config.allowed_origins.len(), 4);
    }

    #[test]
    fn environment_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PORT", "8081"),
            ("DATA_DIR", "/var/lib/store"),
            ("ALLOWED_ORIGINS", "https://a.example/, http://b.example:9000,"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/store"));
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "http://b.example:9000"]
        );
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(matches!(
            AppConfig::from_lookup(lookup(&[("PORT", "eighty")])),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            AppConfig::from_lookup(lookup(&[("ALLOWED_ORIGINS", "*")])),
            Err(ConfigError::InvalidOrigin(_))
        ));
    }
}
