//! Launcher configuration read from the environment snapshot.

use std::str::FromStr;

use crate::env::EnvSnapshot;
use crate::logging::LogFormat;

/// Colon-delimited paths granted read-only access. Mandatory.
pub const ENV_FS_RO: &str = "LL_FS_RO";
/// Colon-delimited paths granted read-write access. Mandatory.
pub const ENV_FS_RW: &str = "LL_FS_RW";
/// Colon-delimited TCP ports the command may bind. Optional.
pub const ENV_TCP_BIND: &str = "LL_TCP_BIND";
/// Colon-delimited TCP ports the command may connect to. Optional.
pub const ENV_TCP_CONNECT: &str = "LL_TCP_CONNECT";
/// Tracing filter directive for the launcher's own diagnostics.
pub const ENV_LOG_FILTER: &str = "SANDBOX_LAUNCHER_LOG";
/// Log output format, `compact` or `json`.
pub const ENV_LOG_FORMAT: &str = "SANDBOX_LAUNCHER_LOG_FORMAT";

/// Variables that make up the launch policy, consumed before exec.
pub const POLICY_VARIABLES: [&str; 4] = [ENV_FS_RO, ENV_FS_RW, ENV_TCP_BIND, ENV_TCP_CONNECT];

const DEFAULT_LOG_FILTER: &str = "warn";

/// Logging settings for the launcher process itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    log_filter: String,
    log_format: LogFormat,
    rejected_log_format: Option<String>,
}

impl LauncherConfig {
    /// Reads logging settings from `snapshot`, falling back to defaults.
    #[must_use]
    pub fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        let log_filter = snapshot
            .get(ENV_LOG_FILTER)
            .map_or_else(|| String::from(DEFAULT_LOG_FILTER), |value| {
                value.to_string_lossy().into_owned()
            });
        let raw_format = snapshot
            .get(ENV_LOG_FORMAT)
            .map(|value| value.to_string_lossy().into_owned());
        let (log_format, rejected_log_format) = match raw_format {
            None => (LogFormat::default(), None),
            Some(raw) => match LogFormat::from_str(&raw) {
                Ok(format) => (format, None),
                Err(_) => (LogFormat::default(), Some(raw)),
            },
        };
        Self {
            log_filter,
            log_format,
            rejected_log_format,
        }
    }

    /// Returns the tracing filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the selected log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the unrecognised format value that was replaced by the default.
    #[must_use]
    pub fn rejected_log_format(&self) -> Option<&str> {
        self.rejected_log_format.as_deref()
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self::from_snapshot(&EnvSnapshot::default())
    }
}
