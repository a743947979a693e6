//! Configuration handling.
//!
//! Pool bounds, per-environment adapter settings loaded from `DB_*` environment
//! variables, and the command-line configuration of the `unidb` binary.

use crate::error::{DbError, DbResult};
use crate::models::connection::parse_flag;
use crate::models::{ConnectionConfig, Dialect, SQLITE_MEMORY};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Storage used by the development environment when no dialect is configured.
pub const DEFAULT_DEV_STORAGE: &str = "./dev.sqlite";

/// Connection pool bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10 for MySQL/PostgreSQL, 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum connections kept open (default: 0)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 10)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Retire pooled connections older than this many seconds (unset: never)
    pub evict_secs: Option<u64>,
}

impl PoolOptions {
    /// Get max_connections with default value based on dialect.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.evict_secs.map(Duration::from_secs)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == Some(0) {
            return Err("max_connections must be greater than 0".to_string());
        }
        if let (Some(min), Some(max)) = (self.min_connections, self.max_connections) {
            if min > max {
                return Err(format!(
                    "min_connections ({}) cannot exceed max_connections ({})",
                    min, max
                ));
            }
        }
        Ok(())
    }

    /// Build pool options from URL query parameters.
    pub(crate) fn from_url_options(opts: &HashMap<String, String>) -> DbResult<Self> {
        let get = |key: &str| opts.get(key).map(String::as_str);
        Ok(Self {
            max_connections: parse_number("max_connections", get("max_connections"))?,
            min_connections: parse_number("min_connections", get("min_connections"))?,
            idle_timeout_secs: parse_number("idle_timeout", get("idle_timeout"))?,
            acquire_timeout_secs: parse_number("acquire_timeout", get("acquire_timeout"))?,
            evict_secs: parse_number("evict", get("evict"))?,
        })
    }
}

fn parse_number<T: FromStr>(key: &str, value: Option<&str>) -> DbResult<Option<T>> {
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| DbError::config(format!("{} must be a number, got '{}'", key, v)))
        })
        .transpose()
}

/// Named deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Adapter configurations for one environment.
///
/// `main` is always present. `replica` is present when `DB_REPLICA_HOST` or
/// `DB_REPLICA_STORAGE` is set; `test` when a `TEST_DB_*` dialect or storage is
/// set outside the test environment.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub environment: Environment,
    pub main: ConnectionConfig,
    pub replica: Option<ConnectionConfig>,
    pub test: Option<ConnectionConfig>,
}

impl DatabaseSettings {
    /// Load settings from the process environment.
    pub fn from_env(environment: Environment) -> DbResult<Self> {
        Self::from_lookup(environment, |key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(environment: Environment, lookup: F) -> DbResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = EnvReader { lookup: &lookup };

        let main = match environment {
            Environment::Development => vars.connection("DB_", Some(DEFAULT_DEV_STORAGE), None)?,
            Environment::Test => vars.connection("TEST_DB_", Some(SQLITE_MEMORY), None)?,
            Environment::Production => vars.connection("DB_", None, None)?,
        };

        let replica = if vars.has("DB_REPLICA_HOST") || vars.has("DB_REPLICA_STORAGE") {
            Some(vars.connection("DB_REPLICA_", None, Some(&main))?)
        } else {
            None
        };

        let test = if environment != Environment::Test
            && (vars.has("TEST_DB_DIALECT") || vars.has("TEST_DB_STORAGE"))
        {
            Some(vars.connection("TEST_DB_", Some(SQLITE_MEMORY), None)?)
        } else {
            None
        };

        Ok(Self {
            environment,
            main,
            replica,
            test,
        })
    }
}

struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn number<T: FromStr>(&self, key: &str) -> DbResult<Option<T>> {
        parse_number(key, self.get(key).as_deref())
    }

    /// Read one `{prefix}*` variable set. `fallback` supplies values the set
    /// leaves unset (a replica mirrors main's dialect and credentials).
    fn connection(
        &self,
        prefix: &str,
        default_storage: Option<&str>,
        fallback: Option<&ConnectionConfig>,
    ) -> DbResult<ConnectionConfig> {
        let key = |name: &str| format!("{prefix}{name}");

        let dialect = match self.get(&key("DIALECT")) {
            Some(value) => Dialect::from_str(&value)?,
            None => match (fallback, default_storage) {
                (Some(main), _) => main.dialect,
                (None, Some(_)) => Dialect::Sqlite,
                (None, None) => {
                    return Err(DbError::config(format!(
                        "{} must be set",
                        key("DIALECT")
                    )));
                }
            },
        };

        let inherit = |name: &str, field: fn(&ConnectionConfig) -> Option<String>| {
            self.get(&key(name))
                .or_else(|| fallback.and_then(|main| field(main)))
        };

        let mut config = ConnectionConfig::new(dialect);
        config.host = self.get(&key("HOST"));
        config.port = match self.number(&key("PORT"))? {
            Some(port) => Some(port),
            None => fallback.and_then(|main| main.port),
        };
        config.database = inherit("NAME", |c| c.database.clone());
        config.username = inherit("USER", |c| c.username.clone());
        config.password = inherit("PASSWORD", |c| c.password.clone());
        config.storage = self
            .get(&key("STORAGE"))
            .or_else(|| default_storage.map(String::from));
        config.ssl.enabled = self.get(&key("SSL")).is_some_and(|v| parse_flag(&v));
        config.ssl.reject_unauthorized = self
            .get(&key("SSL_REJECT_UNAUTHORIZED"))
            .is_some_and(|v| parse_flag(&v));
        config.log_queries = self.get(&key("LOGGING")).is_some_and(|v| parse_flag(&v));
        config.pool.max_connections = self.number(&key("POOL_MAX"))?;
        config.pool.min_connections = self.number(&key("POOL_MIN"))?;
        config.pool.idle_timeout_secs = self.number(&key("POOL_IDLE"))?;
        config.pool.acquire_timeout_secs = self.number(&key("POOL_ACQUIRE"))?;
        config.pool.evict_secs = self.number(&key("POOL_EVICT"))?;

        config.validate()?;
        Ok(config)
    }
}

/// Command-line configuration for the `unidb` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "unidb",
    about = "Inspect and query PostgreSQL, MySQL and SQLite databases through one contract",
    version,
    author
)]
pub struct Config {
    /// Environment whose DB_* settings are loaded
    #[arg(
        short,
        long,
        value_enum,
        default_value = "development",
        env = "APP_ENV"
    )]
    pub environment: Environment,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "UNIDB_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "UNIDB_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check every configured adapter and print the aggregate status as JSON
    Health,
    /// Run a statement, routing reads to the replica when one is configured
    Query {
        /// SQL text with `?` placeholders
        sql: String,
        /// Positional parameters (JSON literals; bare words are strings)
        #[arg(short, long = "param", value_name = "VALUE")]
        params: Vec<String>,
        /// Send the statement to the main adapter even if it is a read
        #[arg(long)]
        main: bool,
    },
    /// Print the column layout of a table
    Schema {
        table: String,
        /// Adapter to inspect (default adapter if omitted)
        #[arg(long)]
        adapter: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_pool_defaults() {
        let opts = PoolOptions::default();
        assert_eq!(opts.max_connections_or_default(false), DEFAULT_MAX_CONNECTIONS);
        assert_eq!(opts.max_connections_or_default(true), DEFAULT_MAX_CONNECTIONS_SQLITE);
        assert_eq!(opts.min_connections_or_default(), DEFAULT_MIN_CONNECTIONS);
        assert_eq!(opts.acquire_timeout(), Duration::from_secs(30));
        assert_eq!(opts.max_lifetime(), None);
    }

    #[test]
    fn test_pool_validate() {
        let zero = PoolOptions {
            max_connections: Some(0),
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let inverted = PoolOptions {
            max_connections: Some(2),
            min_connections: Some(5),
            ..Default::default()
        };
        assert!(inverted.validate().unwrap_err().contains("cannot exceed"));
    }

    #[test]
    fn test_development_defaults_to_sqlite_file() {
        let settings = DatabaseSettings::from_lookup(Environment::Development, lookup(&[])).unwrap();
        assert_eq!(settings.main.dialect, Dialect::Sqlite);
        assert_eq!(settings.main.storage.as_deref(), Some(DEFAULT_DEV_STORAGE));
        assert!(settings.replica.is_none());
        assert!(settings.test.is_none());
    }

    #[test]
    fn test_test_environment_uses_memory() {
        let settings = DatabaseSettings::from_lookup(Environment::Test, lookup(&[])).unwrap();
        assert!(settings.main.is_memory());
    }

    #[test]
    fn test_production_requires_dialect() {
        let result = DatabaseSettings::from_lookup(Environment::Production, lookup(&[]));
        assert!(matches!(result, Err(DbError::Config { .. })));
    }

    #[test]
    fn test_postgres_from_env_with_replica() {
        let vars = lookup(&[
            ("DB_DIALECT", "postgres"),
            ("DB_HOST", "primary.local"),
            ("DB_PORT", "6432"),
            ("DB_NAME", "shop"),
            ("DB_USER", "app"),
            ("DB_PASSWORD", "secret"),
            ("DB_POOL_MAX", "25"),
            ("DB_SSL", "true"),
            ("DB_REPLICA_HOST", "replica.local"),
        ]);
        let settings = DatabaseSettings::from_lookup(Environment::Production, vars).unwrap();

        assert_eq!(settings.main.dialect, Dialect::Postgres);
        assert_eq!(settings.main.port, Some(6432));
        assert_eq!(settings.main.pool.max_connections, Some(25));
        assert!(settings.main.ssl.enabled);

        let replica = settings.replica.unwrap();
        assert_eq!(replica.dialect, Dialect::Postgres);
        assert_eq!(replica.host.as_deref(), Some("replica.local"));
        assert_eq!(replica.database.as_deref(), Some("shop"));
        assert_eq!(replica.username.as_deref(), Some("app"));
        assert_eq!(replica.port, Some(6432));
    }

    #[test]
    fn test_missing_required_field_is_config_error() {
        let vars = lookup(&[("DB_DIALECT", "mysql"), ("DB_HOST", "localhost")]);
        let err = DatabaseSettings::from_lookup(Environment::Production, vars).unwrap_err();
        assert!(err.to_string().contains("database"));
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let vars = lookup(&[("DB_POOL_MAX", "lots")]);
        let err = DatabaseSettings::from_lookup(Environment::Development, vars).unwrap_err();
        assert!(err.to_string().contains("DB_POOL_MAX"));
    }

    #[test]
    fn test_test_adapter_registered_when_configured() {
        let vars = lookup(&[("TEST_DB_DIALECT", "sqlite")]);
        let settings = DatabaseSettings::from_lookup(Environment::Development, vars).unwrap();
        assert!(settings.test.unwrap().is_memory());
    }

    #[test]
    fn test_cli_parses_query_command() {
        let config = Config::parse_from([
            "unidb", "--environment", "test", "query", "SELECT ?", "-p", "1", "--main",
        ]);
        assert_eq!(config.environment, Environment::Test);
        match config.command {
            Command::Query { sql, params, main } => {
                assert_eq!(sql, "SELECT ?");
                assert_eq!(params, vec!["1".to_string()]);
                assert!(main);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
