use crate::config::{LogFormat, LogRotation, LoggingConfig};
use axum::http::{HeaderMap, HeaderValue};
use std::fs;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Honors a well-formed inbound `x-request-id`, otherwise mints one.
pub fn extract_or_generate_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| is_valid_request_id(value))
        .map(ToString::to_string)
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string())
}

pub fn insert_request_id_header(headers: &mut HeaderMap, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
}

fn is_valid_request_id(value: &str) -> bool {
    if value.is_empty() || value.len() > 128 {
        return false;
    }
    value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
}

/// Installs the global tracing subscriber: env-filtered level, text or JSON
/// format, stdout and/or a rolling log file. Safe to call more than once;
/// only the first call installs anything.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();
    static FILE_LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
    if TRACING_INITIALIZED.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_new(logging.level.trim())
        .map_err(|err| format!("invalid `logging.level` value `{}`: {err}", logging.level))?;

    let file_writer = match build_file_log_writer(logging)? {
        Some((writer, guard)) => {
            let _ = FILE_LOG_GUARD.set(guard);
            Some(writer)
        }
        None => None,
    };

    let init_result = match logging.format {
        LogFormat::Json => {
            let stdout_layer = logging
                .to_stdout
                .then(|| tracing_subscriber::fmt::layer().json());
            let file_layer = file_writer.map(|writer| {
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
            });

            tracing::subscriber::set_global_default(
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(stdout_layer)
                    .with(file_layer),
            )
        }
        LogFormat::Text => {
            let stdout_layer = logging.to_stdout.then(tracing_subscriber::fmt::layer);
            let file_layer = file_writer.map(|writer| {
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
            });

            tracing::subscriber::set_global_default(
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(stdout_layer)
                    .with(file_layer),
            )
        }
    };

    init_result.map_err(|err| format!("failed to initialize tracing subscriber: {err}"))?;

    let _ = TRACING_INITIALIZED.set(());
    Ok(())
}

type FileLogWriter = (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
);

fn build_file_log_writer(logging: &LoggingConfig) -> Result<Option<FileLogWriter>, String> {
    let Some(file) = &logging.file else {
        return Ok(None);
    };
    if !file.enabled {
        return Ok(None);
    }

    let dir = file.dir.trim();
    fs::create_dir_all(dir)
        .map_err(|err| format!("failed to create log directory `{dir}`: {err}"))?;

    let appender = tracing_appender::rolling::RollingFileAppender::new(
        tracing_rotation(&file.rotation),
        dir,
        file.prefix.trim(),
    );
    Ok(Some(tracing_appender::non_blocking(appender)))
}

fn tracing_rotation(rotation: &LogRotation) -> tracing_appender::rolling::Rotation {
    match rotation {
        LogRotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
        LogRotation::Daily => tracing_appender::rolling::Rotation::DAILY,
        LogRotation::Never => tracing_appender::rolling::Rotation::NEVER,
    }
}

#[cfg(test)]
mod tests {
    use super::{extract_or_generate_request_id, tracing_rotation};
    use crate::config::LogRotation;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn keep_valid_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("trace-123_abc"));

        let request_id = extract_or_generate_request_id(&headers);
        assert_eq!(request_id, "trace-123_abc");
    }

    #[test]
    fn generate_request_id_for_invalid_value() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("bad request id"));

        let request_id = extract_or_generate_request_id(&headers);
        assert!(!request_id.is_empty());
        assert_ne!(request_id, "bad request id");
    }

    #[test]
    fn tracing_rotation_mapping_works() {
        assert_eq!(
            tracing_rotation(&LogRotation::Hourly),
            tracing_appender::rolling::Rotation::HOURLY
        );
        assert_eq!(
            tracing_rotation(&LogRotation::Daily),
            tracing_appender::rolling::Rotation::DAILY
        );
        assert_eq!(
            tracing_rotation(&LogRotation::Never),
            tracing_appender::rolling::Rotation::NEVER
        );
    }
}
