use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_address: IpAddr,
    /// Upper bound on exit scenarios accepted in one returns request.
    pub max_scenarios: usize,
    /// Scenarios evaluated at once per request.
    pub scenario_concurrency: usize,
    /// Default for `include_irr` when a request leaves it out.
    pub returns_include_irr: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_var(&env_map, "PORT", "8080", "must be a valid u16")?;
        let bind_address = parse_var(
            &env_map,
            "BIND_ADDRESS",
            "127.0.0.1",
            "must be an IPv4 or IPv6 address",
        )?;
        let max_scenarios: usize =
            parse_var(&env_map, "MAX_SCENARIOS", "32", "must be a positive integer")?;
        let scenario_concurrency: usize = parse_var(
            &env_map,
            "SCENARIO_CONCURRENCY",
            "4",
            "must be a positive integer",
        )?;

        if max_scenarios == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_SCENARIOS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if scenario_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "SCENARIO_CONCURRENCY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let returns_include_irr = match env_map
            .get("RETURNS_INCLUDE_IRR")
            .map(|s| s.as_str())
            .unwrap_or("false")
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "RETURNS_INCLUDE_IRR".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        Ok(Config {
            port,
            bind_address,
            max_scenarios,
            scenario_concurrency,
            returns_include_irr,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: IpAddr::from([127, 0, 0, 1]),
            max_scenarios: 32,
            scenario_concurrency: 4,
            returns_include_irr: false,
        }
    }
}

fn parse_var<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), expected.to_string()))
}
