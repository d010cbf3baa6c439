use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to write config {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("no config directory: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub checks: CheckConfig,
    pub scheduler: SchedulerConfig,
    pub retention: RetentionConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

/// Probe timeouts and classification thresholds handed to the checker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Per-packet ping timeout, seconds
    pub ping_timeout: u64,
    pub ping_count: u32,
    /// Seconds between echo requests
    pub ping_interval: f64,
    pub tcp_timeout: u64,
    pub http_timeout: u64,
    /// Certificates expiring within this many days are `ssl_expiring`
    pub ssl_warning_days: i64,
    /// Timeout of the certificate side-channel request, seconds
    pub certificate_timeout: u64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            ping_timeout: 3,
            ping_count: 1,
            ping_interval: 0.2,
            tcp_timeout: 3,
            http_timeout: 10,
            ssl_warning_days: 7,
            certificate_timeout: 5,
        }
    }
}

impl CheckConfig {
    /// Upper bound on the wall time of one check, in seconds
    pub fn check_deadline_seconds(&self) -> u64 {
        let ping = self.ping_timeout + 2;
        let http = self.http_timeout + self.certificate_timeout;
        ping.max(self.tcp_timeout).max(http) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub default_frequency_minutes: u32,
    pub max_concurrency: usize,
    pub tick_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { default_frequency_minutes: 5, max_concurrency: 8, tick_seconds: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Omit to keep logs forever
    pub log_retention_days: Option<i64>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { log_retention_days: Some(30) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "vigil.db".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 8080 }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigil/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("vigil/config.toml"))
}

/// Parse `name` from the environment, keeping `current` when unset or invalid
fn env_override<T: std::str::FromStr>(name: &str, current: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring {}={:?}: not a valid value", name, raw);
                current
            }
        },
        Err(_) => current,
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        let retention = match self.retention.log_retention_days {
            Some(days) => format!("{days} days"),
            None => "forever".to_string(),
        };

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "Checks")?;
        write_1(f, "Ping Timeout (s)", &self.checks.ping_timeout)?;
        write_1(f, "Ping Count", &self.checks.ping_count)?;
        write_1(f, "Ping Interval (s)", &self.checks.ping_interval)?;
        write_1(f, "TCP Timeout (s)", &self.checks.tcp_timeout)?;
        write_1(f, "HTTP Timeout (s)", &self.checks.http_timeout)?;
        write_1(f, "SSL Warning (days)", &self.checks.ssl_warning_days)?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Default Frequency (min)", &self.scheduler.default_frequency_minutes)?;
        write_1(f, "Max Concurrency", &self.scheduler.max_concurrency)?;
        write_title_1(f, "Retention")?;
        write_1(f, "Logs Kept", &retention)?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/vigil/config.toml
    ///  or the specified path, with the name config.toml if one does not exist.
    /// Environment overrides are applied afterwards and the result validated.
    ///
    /// ```no_run
    /// # use vigil_service::config::Config;
    /// let cfg = Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), vigil_service::config::ConfigError>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let mut config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Apply `VIGIL_*` environment variables on top of the file values
    pub fn apply_env_overrides(&mut self) {
        let checks = &mut self.checks;
        checks.ping_timeout = env_override("VIGIL_PING_TIMEOUT", checks.ping_timeout);
        checks.ping_count = env_override("VIGIL_PING_COUNT", checks.ping_count);
        checks.ping_interval = env_override("VIGIL_PING_INTERVAL", checks.ping_interval);

        self.scheduler.default_frequency_minutes =
            env_override("VIGIL_DEFAULT_FREQUENCY", self.scheduler.default_frequency_minutes);

        if let Ok(raw) = env::var("VIGIL_LOG_RETENTION_DAYS") {
            match raw.trim().parse::<i64>() {
                Ok(days) => self.retention.log_retention_days = Some(days),
                Err(_) => warn!("Ignoring VIGIL_LOG_RETENTION_DAYS={:?}: not a number", raw),
            }
        }

        if let Ok(path) = env::var("VIGIL_DATABASE_PATH") {
            if !path.trim().is_empty() {
                self.database.path = path;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = &self.checks;
        validate_timeout("checks.ping_timeout", checks.ping_timeout)?;
        validate_timeout("checks.tcp_timeout", checks.tcp_timeout)?;
        validate_timeout("checks.http_timeout", checks.http_timeout)?;
        validate_timeout("checks.certificate_timeout", checks.certificate_timeout)?;

        if checks.ping_count < 1 {
            return Err(invalid("checks.ping_count", "must be at least 1"));
        }
        if !(checks.ping_interval >= 0.2) {
            return Err(invalid("checks.ping_interval", "must be at least 0.2 seconds"));
        }
        if checks.ssl_warning_days < 0 {
            return Err(invalid("checks.ssl_warning_days", "must not be negative"));
        }

        let frequency = self.scheduler.default_frequency_minutes;
        if !(1..=1440).contains(&frequency) {
            return Err(invalid(
                "scheduler.default_frequency_minutes",
                format!("{frequency} is outside 1..=1440"),
            ));
        }
        if self.scheduler.max_concurrency < 1 {
            return Err(invalid("scheduler.max_concurrency", "must be at least 1"));
        }
        if self.scheduler.tick_seconds < 1 {
            return Err(invalid("scheduler.tick_seconds", "must be at least 1"));
        }

        if let Some(days) = self.retention.log_retention_days {
            if days < 1 {
                return Err(invalid(
                    "retention.log_retention_days",
                    format!("{days} must be at least 1, omit it to keep logs forever"),
                ));
            }
        }

        Ok(())
    }
}

fn validate_timeout(key: &'static str, seconds: u64) -> Result<(), ConfigError> {
    if (1..=300).contains(&seconds) {
        Ok(())
    } else {
        Err(invalid(key, format!("{seconds}s is outside 1..=300")))
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { key, reason: reason.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.checks.http_timeout, 10);
        assert_eq!(config.scheduler.default_frequency_minutes, 5);
        assert_eq!(config.retention.log_retention_days, Some(30));
    }

    #[test]
    fn test_check_deadline() {
        let checks = CheckConfig::default();
        // http 10 + certificate 5 dominates, plus one second of slack
        assert_eq!(checks.check_deadline_seconds(), 16);

        let checks = CheckConfig { ping_timeout: 30, ..CheckConfig::default() };
        assert_eq!(checks.check_deadline_seconds(), 33);
    }

    #[test]
    fn test_normalize_toml_path() {
        assert_eq!(normalize_toml_path(path::Path::new("a/b")), path::PathBuf::from("a/b.toml"));
        assert_eq!(
            normalize_toml_path(path::Path::new("a/b.json")),
            path::PathBuf::from("a/b.toml")
        );
        assert_eq!(
            normalize_toml_path(path::Path::new("a/b.toml")),
            path::PathBuf::from("a/b.toml")
        );
    }

    #[test]
    fn test_writes_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/vigil");

        let config = Config::from_config(Some(&path)).unwrap();
        assert!(dir.path().join("nested/vigil.toml").exists());
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[checks]\nhttp_timeout = 20\n\n[server]\nport = 9000\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.checks.http_timeout, 20);
        assert_eq!(config.checks.tcp_timeout, 3);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "0.0.0.0");
    }

    #[test]
    fn test_invalid_values_name_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scheduler]\ndefault_frequency_minutes = 0\n").unwrap();

        match Config::from_config(Some(&path)) {
            Err(ConfigError::Invalid { key, .. }) => {
                assert_eq!(key, "scheduler.default_frequency_minutes")
            }
            other => panic!("expected invalid config, got {other:?}"),
        }

        let config = Config {
            checks: CheckConfig { ping_interval: 0.1, ..CheckConfig::default() },
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "checks.ping_interval", .. })
        ));

        let config = Config {
            checks: CheckConfig { http_timeout: 301, ..CheckConfig::default() },
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "checks.http_timeout", .. })
        ));

        for days in [0, -1] {
            let config = Config {
                retention: RetentionConfig { log_retention_days: Some(days) },
                ..Config::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid { key: "retention.log_retention_days", .. })
            ));
        }

        let config = Config {
            retention: RetentionConfig { log_retention_days: None },
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_garbage_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(ConfigError::ParseFailed(_))));
    }

    #[test]
    fn test_display_lists_sections() {
        let rendered = Config::default().to_string();
        assert!(rendered.contains("Checks"));
        assert!(rendered.contains("Logs Kept: 30 days"));
        assert!(rendered.contains("Port: 8080"));
    }
}
