use std::fmt;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

/// PostgreSQL connection parameters, read from `DB_HOST`, `DB_PORT`,
/// `DB_NAME`, `DB_USER` and `DB_PASSWORD`. None of them has a default.
#[derive(Clone, Deserialize)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl DbSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_environment(Environment::with_prefix("DB"))
    }

    fn from_environment(source: Environment) -> Result<Self> {
        Config::builder()
            .add_source(source.try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .context("DB_HOST, DB_PORT, DB_NAME, DB_USER and DB_PASSWORD must all be set")
    }
}

impl fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}
