use std::time::Duration;

/// Errors raised while reading dispatcher configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Dispatcher configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Time between dispatch cycles (default: 10 s).
    pub dispatch_interval: Duration,
    /// Bound on waiting for the loop at shutdown (default: 30 s).
    pub shutdown_timeout: Duration,
    /// Fail jobs stranded in UPLOADING before the loop starts (default: on).
    pub recover_stranded_jobs: bool,
}

impl DispatcherConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                  | Default  |
    /// |--------------------------|----------|
    /// | `DATABASE_URL`           | required |
    /// | `DISPATCH_INTERVAL_SECS` | `10`     |
    /// | `SHUTDOWN_TIMEOUT_SECS`  | `30`     |
    /// | `RECOVER_STRANDED_JOBS`  | `true`   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let dispatch_interval_secs = parse_secs(&lookup, "DISPATCH_INTERVAL_SECS", 10)?;
        if dispatch_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "DISPATCH_INTERVAL_SECS",
                expected: "a positive number of seconds",
                value: "0".into(),
            });
        }
        let shutdown_timeout_secs = parse_secs(&lookup, "SHUTDOWN_TIMEOUT_SECS", 30)?;

        let recover_stranded_jobs = match lookup("RECOVER_STRANDED_JOBS") {
            None => true,
            Some(value) => parse_bool(&value).ok_or(ConfigError::Invalid {
                name: "RECOVER_STRANDED_JOBS",
                expected: "a boolean",
                value,
            })?,
        };

        Ok(Self {
            database_url,
            dispatch_interval: Duration::from_secs(dispatch_interval_secs),
            shutdown_timeout: Duration::from_secs(shutdown_timeout_secs),
            recover_stranded_jobs,
        })
    }
}

fn parse_secs<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected: "a whole number of seconds",
            value,
        }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<DispatcherConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DispatcherConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/factoryos")]).unwrap();
        assert_eq!(config.database_url, "postgres://localhost/factoryos");
        assert_eq!(config.dispatch_interval, Duration::from_secs(10));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert!(config.recover_stranded_jobs);
    }

    #[test]
    fn database_url_is_required() {
        assert_matches!(load(&[]), Err(ConfigError::Missing("DATABASE_URL")));
        assert_matches!(
            load(&[("DATABASE_URL", "  ")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/factoryos"),
            ("DISPATCH_INTERVAL_SECS", "3"),
            ("SHUTDOWN_TIMEOUT_SECS", "5"),
            ("RECOVER_STRANDED_JOBS", "off"),
        ])
        .unwrap();
        assert_eq!(config.dispatch_interval, Duration::from_secs(3));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert!(!config.recover_stranded_jobs);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        assert_matches!(
            load(&[("DATABASE_URL", "x"), ("DISPATCH_INTERVAL_SECS", "ten")]),
            Err(ConfigError::Invalid { name: "DISPATCH_INTERVAL_SECS", .. })
        );
        assert_matches!(
            load(&[("DATABASE_URL", "x"), ("DISPATCH_INTERVAL_SECS", "0")]),
            Err(ConfigError::Invalid { name: "DISPATCH_INTERVAL_SECS", .. })
        );
        assert_matches!(
            load(&[("DATABASE_URL", "x"), ("RECOVER_STRANDED_JOBS", "maybe")]),
            Err(ConfigError::Invalid { name: "RECOVER_STRANDED_JOBS", .. })
        );
    }
}
