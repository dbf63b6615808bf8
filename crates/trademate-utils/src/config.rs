//! Application-level configuration

use serde::{Deserialize, Serialize};

const ENVIRONMENT_VAR: &str = "TRADEMATE_ENV";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Environment (development, production, ...)
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "trademate".to_string(),
            environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Defaults, with the environment taken from `TRADEMATE_ENV` when set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(environment) = std::env::var(ENVIRONMENT_VAR) {
            if !environment.trim().is_empty() {
                config.environment = environment.trim().to_string();
            }
        }
        config
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
