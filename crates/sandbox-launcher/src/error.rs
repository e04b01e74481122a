//! Domain errors raised while compiling and enforcing a launch policy.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::telemetry::TelemetryError;

const HINT_UNSUPPORTED: &str = "Landlock is not supported by the current kernel. \
    To support it, build the kernel with CONFIG_SECURITY_LANDLOCK=y and prepend \
    \"landlock,\" to the content of CONFIG_LSM.";

const HINT_DISABLED: &str = "Landlock is currently disabled. It can be enabled in the \
    kernel configuration by prepending \"landlock,\" to the content of CONFIG_LSM, \
    or at boot time by setting the same content to the \"lsm\" kernel parameter.";

const HINT_NETWORK: &str = "TCP port rules need Landlock ABI version 4; \
    unset LL_TCP_BIND and LL_TCP_CONNECT to run without them.";

const HINT_EXEC: &str =
    "access to the binary, the interpreter or shared libraries may be denied.";

/// Filesystem operation that failed while preparing a path rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PathOperation {
    /// Opening an `O_PATH` handle.
    Open,
    /// Querying the handle's file type.
    Stat,
}

/// Rule whose registration the kernel rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleTarget {
    /// A path-beneath rule.
    Path(PathBuf),
    /// A network port rule.
    Port(u16),
}

impl fmt::Display for RuleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "\"{}\"", path.display()),
            Self::Port(port) => write!(f, "port \"{port}\""),
        }
    }
}

/// Errors raised while preparing or launching a sandboxed command.
///
/// Every variant is fatal: the target command never runs once one of these
/// has been produced.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The command line could not be parsed.
    #[error("{0}")]
    Usage(#[from] clap::Error),

    /// The kernel does not provide Landlock at all.
    #[error("failed to check Landlock compatibility: {source}")]
    UnsupportedHost {
        /// Error reported by the version probe.
        #[source]
        source: io::Error,
    },

    /// Landlock is built into the kernel but disabled.
    #[error("failed to check Landlock compatibility: {source}")]
    FeatureDisabled {
        /// Error reported by the version probe.
        #[source]
        source: io::Error,
    },

    /// The version probe failed for another reason.
    #[error("failed to check Landlock compatibility: {source}")]
    CapabilityQuery {
        /// Error reported by the version probe.
        #[source]
        source: io::Error,
    },

    /// A mandatory policy variable is absent from the environment.
    #[error("missing environment variable {variable}")]
    MissingConfig {
        /// Name of the absent variable.
        variable: &'static str,
    },

    /// A port token is not a valid port number.
    #[error("invalid port {token:?} in {variable}")]
    InvalidPort {
        /// Variable the token came from.
        variable: &'static str,
        /// Offending token.
        token: OsString,
    },

    /// A rule path could not be opened or classified.
    #[error("failed to {operation} \"{}\": {source}", path.display())]
    InvalidPath {
        /// Offending path.
        path: PathBuf,
        /// Step that failed.
        operation: PathOperation,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The kernel rejected a rule.
    #[error("failed to update the ruleset with {target}: {source}")]
    RuleAddition {
        /// Rule that was rejected.
        target: RuleTarget,
        /// Underlying system error.
        #[source]
        source: io::Error,
    },

    /// A port rule names a network right the host cannot restrict.
    #[error(
        "failed to update the ruleset with port \"{port}\": the running kernel \
         cannot restrict TCP ports"
    )]
    UnhandledNetworkRight {
        /// Port of the rejected rule.
        port: u16,
    },

    /// The kernel refused to allocate a ruleset.
    #[error("failed to create a ruleset: {source}")]
    RulesetCreation {
        /// Underlying system error.
        #[source]
        source: io::Error,
    },

    /// `no_new_privs` could not be set.
    #[error("failed to restrict privileges: {source}")]
    PrivilegeLock {
        /// Underlying system error.
        #[source]
        source: io::Error,
    },

    /// The ruleset could not be applied to the current process.
    #[error("failed to enforce ruleset: {source}")]
    RulesetEnforcement {
        /// Underlying system error.
        #[source]
        source: io::Error,
    },

    /// The target command could not replace the process image.
    #[error("failed to execute \"{}\": {source}", command.to_string_lossy())]
    Exec {
        /// Command as supplied on the command line.
        command: OsString,
        /// Underlying system error.
        #[source]
        source: io::Error,
    },

    /// The current process hosts more than one thread.
    #[error("sandboxing must occur in a single-threaded context (observed {thread_count} threads)")]
    MultiThreaded {
        /// Threads observed in `/proc/self/status`.
        thread_count: usize,
    },

    /// Thread count could not be determined from `/proc`.
    #[error("failed to determine thread count: {source}")]
    ThreadCountUnavailable {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Logging could not be initialised.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

impl SandboxError {
    /// Classifies a failed ABI probe by errno.
    pub(crate) fn from_capability_probe(source: io::Error) -> Self {
        match source.raw_os_error() {
            Some(libc::ENOSYS) => Self::UnsupportedHost { source },
            Some(libc::EOPNOTSUPP) => Self::FeatureDisabled { source },
            None if source.kind() == io::ErrorKind::Unsupported => {
                Self::UnsupportedHost { source }
            }
            _ => Self::CapabilityQuery { source },
        }
    }

    /// Remediation guidance printed after the diagnostic, if any.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnsupportedHost { .. } => Some(HINT_UNSUPPORTED),
            Self::FeatureDisabled { .. } => Some(HINT_DISABLED),
            Self::UnhandledNetworkRight { .. } => Some(HINT_NETWORK),
            Self::Exec { .. } => Some(HINT_EXEC),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::missing(libc::ENOSYS, "not supported")]
    #[case::disabled(libc::EOPNOTSUPP, "currently disabled")]
    fn probe_errors_carry_distinct_hints(#[case] errno: i32, #[case] needle: &str) {
        let error = SandboxError::from_capability_probe(io::Error::from_raw_os_error(errno));
        let hint = error.hint().unwrap_or_default();
        assert!(hint.contains(needle), "unexpected hint: {hint}");
    }

    #[rstest]
    #[case::missing(libc::ENOSYS)]
    #[case::disabled(libc::EOPNOTSUPP)]
    fn probe_errnos_keep_their_own_kind(#[case] errno: i32) {
        let error = SandboxError::from_capability_probe(io::Error::from_raw_os_error(errno));
        let expected_disabled = errno == libc::EOPNOTSUPP;
        assert_eq!(
            matches!(error, SandboxError::FeatureDisabled { .. }),
            expected_disabled,
            "{error:?}"
        );
        assert_eq!(
            matches!(error, SandboxError::UnsupportedHost { .. }),
            !expected_disabled,
            "{error:?}"
        );
    }

    #[test]
    fn platform_without_errno_is_unsupported() {
        let source = io::Error::new(io::ErrorKind::Unsupported, "not linux");
        let error = SandboxError::from_capability_probe(source);
        assert!(matches!(error, SandboxError::UnsupportedHost { .. }));
    }

    #[test]
    fn unhandled_network_right_names_the_port() {
        let error = SandboxError::UnhandledNetworkRight { port: 9418 };
        assert!(error.to_string().contains("port \"9418\""), "{error}");
        assert!(error.hint().is_some_and(|hint| hint.contains("ABI version 4")));
    }

    #[test]
    fn unexpected_probe_errno_has_no_hint() {
        let error = SandboxError::from_capability_probe(io::Error::from_raw_os_error(libc::EPERM));
        assert!(matches!(error, SandboxError::CapabilityQuery { .. }));
        assert!(error.hint().is_none());
    }

    #[test]
    fn rule_failures_name_the_port() {
        let error = SandboxError::RuleAddition {
            target: RuleTarget::Port(443),
            source: io::Error::from_raw_os_error(libc::EINVAL),
        };
        assert!(error.to_string().starts_with("failed to update the ruleset with port \"443\""));
    }

    #[test]
    fn path_failures_name_the_path_and_step() {
        let error = SandboxError::InvalidPath {
            path: PathBuf::from("/missing"),
            operation: PathOperation::Open,
            source: io::Error::from_raw_os_error(libc::ENOENT),
        };
        assert!(error.to_string().starts_with("failed to open \"/missing\": "));
    }
}
