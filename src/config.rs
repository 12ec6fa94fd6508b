use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub listen: String,
    pub services: ServicesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The three fixed downstreams. Every route is bound to exactly one of them
/// at compile time; nothing is discovered at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    pub auth: ServiceConfig,
    pub jobs: ServiceConfig,
    pub applications: ServiceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub to_stdout: bool,
    #[serde(default)]
    pub file: Option<LogFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogFileConfig {
    #[serde(default)]
    pub enabled: bool,
    pub dir: String,
    pub prefix: String,
    #[serde(default)]
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            to_stdout: true,
            file: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    MissingEnvVar(String),
    Validation(String),
}

impl AppConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(yaml)?;
        let config: Self = serde_yaml::from_str(&interpolated).map_err(ConfigError::Yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "`listen` must not be empty".to_string(),
            ));
        }

        for (name, service) in [
            ("auth", &self.services.auth),
            ("jobs", &self.services.jobs),
            ("applications", &self.services.applications),
        ] {
            service.validate(name)?;
        }

        if let Some(file) = &self.logging.file
            && file.enabled
        {
            if file.dir.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "`logging.file.dir` must not be empty".to_string(),
                ));
            }
            if file.prefix.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "`logging.file.prefix` must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl ServiceConfig {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "`services.{name}.base_url` must not be empty"
            )));
        }

        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Validation(format!(
                "`services.{name}.connect_timeout_ms` must be > 0"
            )));
        }

        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(format!(
                "`services.{name}.request_timeout_ms` must be > 0"
            )));
        }

        Ok(())
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Yaml(err) => write!(f, "yaml parse error: {err}"),
            Self::MissingEnvVar(name) => write!(f, "missing environment variable `{name}`"),
            Self::Validation(msg) => write!(f, "config validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(rel_start) = input[cursor..].find("${") {
        let start = cursor + rel_start;
        out.push_str(&input[cursor..start]);

        let key_start = start + 2;
        let rel_end = input[key_start..].find('}').ok_or_else(|| {
            ConfigError::Validation("unterminated `${...}` expression".to_string())
        })?;
        let end = key_start + rel_end;
        let key = &input[key_start..end];

        if key.is_empty() {
            return Err(ConfigError::Validation(
                "empty environment variable name in `${}`".to_string(),
            ));
        }

        let value = env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))?;
        out.push_str(&value);
        cursor = end + 1;
    }

    out.push_str(&input[cursor..]);
    Ok(out)
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

#[cfg(test)]
mod tests {
    use super::AppConfig;

    #[test]
    fn parse_minimal_config() {
        let yaml = r#"
listen: "127.0.0.1:8080"
services:
  auth:
    base_url: "http://localhost:3001"
  jobs:
    base_url: "http://localhost:3002"
  applications:
    base_url: "http://localhost:3003"
"#;

        let config = AppConfig::from_yaml_str(yaml).expect("config should parse");
        assert_eq!(config.services.auth.base_url, "http://localhost:3001");
        assert_eq!(config.services.jobs.connect_timeout_ms, 10_000);
        assert_eq!(config.services.applications.request_timeout_ms, 60_000);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.to_stdout);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn parse_config_with_env_interpolation() {
        let yaml = r#"
listen: "127.0.0.1:8080"
services:
  auth:
    base_url: "http://localhost:3001"
  jobs:
    base_url: "http://localhost:3002"
  applications:
    base_url: "http://${PATH}"
"#;

        let config = AppConfig::from_yaml_str(yaml).expect("config should parse");
        assert!(config.services.applications.base_url.len() > "http://".len());
    }

    #[test]
    fn reject_missing_env_var() {
        let yaml = r#"
listen: "127.0.0.1:8080"
services:
  auth:
    base_url: "http://${HIRE_GW_NO_SUCH_VAR}"
  jobs:
    base_url: "http://localhost:3002"
  applications:
    base_url: "http://localhost:3003"
"#;

        let error = AppConfig::from_yaml_str(yaml).expect_err("config should fail");
        assert!(error.to_string().contains("HIRE_GW_NO_SUCH_VAR"));
    }

    #[test]
    fn reject_empty_base_url() {
        let yaml = r#"
listen: "127.0.0.1:8080"
services:
  auth:
    base_url: ""
  jobs:
    base_url: "http://localhost:3002"
  applications:
    base_url: "http://localhost:3003"
"#;

        let error = AppConfig::from_yaml_str(yaml).expect_err("config should fail");
        assert!(
            error
                .to_string()
                .contains("`services.auth.base_url` must not be empty")
        );
    }

    #[test]
    fn reject_zero_timeout() {
        let yaml = r#"
listen: "127.0.0.1:8080"
services:
  auth:
    base_url: "http://localhost:3001"
  jobs:
    base_url: "http://localhost:3002"
    request_timeout_ms: 0
  applications:
    base_url: "http://localhost:3003"
"#;

        let error = AppConfig::from_yaml_str(yaml).expect_err("config should fail");
        assert!(
            error
                .to_string()
                .contains("`services.jobs.request_timeout_ms` must be > 0")
        );
    }
}
