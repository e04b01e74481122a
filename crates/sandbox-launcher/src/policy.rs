//! Compiles environment-supplied lists into a launch policy.
//!
//! Filesystem categories are mandatory so a forgotten variable cannot
//! silently disable a restriction. Network categories are optional: when a
//! variable is absent its right is never handled by the ruleset at all.

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::PathBuf;

use tracing::debug;

use crate::abi::{CapabilityLevel, compute_effective_mask};
use crate::access::{AccessFs, AccessNet};
use crate::config::{ENV_FS_RO, ENV_FS_RW, ENV_TCP_BIND, ENV_TCP_CONNECT};
use crate::env::EnvSnapshot;
use crate::error::SandboxError;

const DELIMITER: u8 = b':';

/// Ordered tokens from a colon-delimited variable.
///
/// A list holding exactly one empty token is the "requested but empty"
/// sentinel: the category is handled but grants nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedList {
    tokens: Vec<OsString>,
}

impl DelimitedList {
    /// Returns true for the single-empty-token sentinel.
    #[must_use]
    pub fn is_empty_sentinel(&self) -> bool {
        matches!(self.tokens.as_slice(), [only] if only.is_empty())
    }

    /// Returns the tokens in declaration order.
    #[must_use]
    pub fn tokens(&self) -> &[OsString] {
        &self.tokens
    }

    /// Returns the tokens to act upon, empty for the sentinel.
    fn into_entries(self) -> Vec<OsString> {
        if self.is_empty_sentinel() {
            Vec::new()
        } else {
            self.tokens
        }
    }
}

/// Splits `value` on `:`, keeping empty tokens and their order.
///
/// ```
/// use std::ffi::OsStr;
/// use sandbox_launcher::parse_delimited_list;
///
/// let list = parse_delimited_list(OsStr::new("/a:/b:/c"));
/// assert_eq!(list.tokens(), ["/a", "/b", "/c"]);
/// assert!(parse_delimited_list(OsStr::new("")).is_empty_sentinel());
/// ```
#[must_use]
pub fn parse_delimited_list(value: &OsStr) -> DelimitedList {
    DelimitedList {
        tokens: value
            .as_bytes()
            .split(|byte| *byte == DELIMITER)
            .map(|token| OsString::from_vec(token.to_vec()))
            .collect(),
    }
}

/// Parses a port token.
///
/// With the `lenient-ports` feature the token is read like C's `atoi`:
/// leading whitespace and a sign are accepted, trailing garbage after the
/// digits is ignored and a token without digits reads as port 0. Without the
/// feature the whole token must be a decimal port number.
///
/// # Errors
///
/// Returns [`SandboxError::InvalidPort`] when the value read from `token`
/// falls outside `0..=65535`, or, without `lenient-ports`, when `token` is
/// not a decimal number.
pub fn parse_port(variable: &'static str, token: &OsStr) -> Result<u16, SandboxError> {
    let value = if cfg!(feature = "lenient-ports") {
        Some(leading_integer(token.as_bytes()))
    } else {
        token
            .to_str()
            .and_then(|text| text.parse::<u16>().ok())
            .map(i64::from)
    };
    value
        .and_then(|number| u16::try_from(number).ok())
        .ok_or_else(|| SandboxError::InvalidPort {
            variable,
            token: token.to_os_string(),
        })
}

/// Reads the signed decimal prefix of `token`, saturating on overflow.
fn leading_integer(token: &[u8]) -> i64 {
    let mut bytes = token
        .iter()
        .copied()
        .skip_while(|byte| byte.is_ascii_whitespace() || *byte == b'\x0b')
        .peekable();
    let negative = match bytes.peek() {
        Some(b'-') => {
            bytes.next();
            true
        }
        Some(b'+') => {
            bytes.next();
            false
        }
        _ => false,
    };
    let magnitude = bytes
        .take_while(u8::is_ascii_digit)
        .fold(0_i64, |number, digit| {
            number
                .saturating_mul(10)
                .saturating_add(i64::from(digit - b'0'))
        });
    if negative { -magnitude } else { magnitude }
}

fn parse_port_list(
    variable: &'static str,
    list: DelimitedList,
) -> Result<Vec<u16>, SandboxError> {
    list.into_entries()
        .iter()
        .map(|token| parse_port(variable, token))
        .collect()
}

/// A path and the rights requested beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathGrant {
    /// Rule target.
    pub path: PathBuf,
    /// Rights requested, before file-type restriction.
    pub access: AccessFs,
}

/// A port and the single network right granted on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortGrant {
    /// TCP port.
    pub port: u16,
    /// Exactly one of [`AccessNet::BIND_TCP`] or [`AccessNet::CONNECT_TCP`].
    pub access: AccessNet,
}

/// Lists parsed from the environment, before negotiation is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRequest {
    read_only: Vec<PathBuf>,
    read_write: Vec<PathBuf>,
    bind: Option<Vec<u16>>,
    connect: Option<Vec<u16>>,
}

impl PolicyRequest {
    /// Compiles the four policy variables from `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::MissingConfig`] naming `LL_FS_RO` or
    /// `LL_FS_RW` when either is absent (read-only is checked first), and
    /// [`SandboxError::InvalidPort`] for rejected port tokens.
    pub fn compile(snapshot: &EnvSnapshot) -> Result<Self, SandboxError> {
        let read_only = required_paths(snapshot, ENV_FS_RO)?;
        let read_write = required_paths(snapshot, ENV_FS_RW)?;
        let bind = optional_ports(snapshot, ENV_TCP_BIND)?;
        let connect = optional_ports(snapshot, ENV_TCP_CONNECT)?;
        debug!(
            read_only = read_only.len(),
            read_write = read_write.len(),
            bind = ?bind,
            connect = ?connect,
            "compiled launch policy"
        );
        Ok(Self {
            read_only,
            read_write,
            bind,
            connect,
        })
    }

    /// Read-only paths in declaration order.
    #[must_use]
    pub fn read_only(&self) -> &[PathBuf] {
        &self.read_only
    }

    /// Read-write paths in declaration order.
    #[must_use]
    pub fn read_write(&self) -> &[PathBuf] {
        &self.read_write
    }

    /// Bind ports, or `None` when the category is disabled.
    #[must_use]
    pub fn bind(&self) -> Option<&[u16]> {
        self.bind.as_deref()
    }

    /// Connect ports, or `None` when the category is disabled.
    #[must_use]
    pub fn connect(&self) -> Option<&[u16]> {
        self.connect.as_deref()
    }

    /// Filesystem rights requested from the negotiator.
    #[must_use]
    pub const fn requested_fs(&self) -> AccessFs {
        AccessFs::ROUGHLY_READ.union(AccessFs::ROUGHLY_WRITE)
    }

    /// Network rights requested from the negotiator, one per present category.
    #[must_use]
    pub fn requested_net(&self) -> AccessNet {
        let mut requested = AccessNet::empty();
        if self.bind.is_some() {
            requested |= AccessNet::BIND_TCP;
        }
        if self.connect.is_some() {
            requested |= AccessNet::CONNECT_TCP;
        }
        requested
    }

    /// Combines the lists with the masks `level` can enforce.
    #[must_use]
    pub fn resolve(self, level: CapabilityLevel) -> RulesetPolicy {
        let effective = compute_effective_mask(self.requested_fs(), self.requested_net(), level);
        let read_only_access = AccessFs::ROUGHLY_READ & effective.fs;
        let read_write_access = self.requested_fs() & effective.fs;

        let filesystem = self
            .read_only
            .into_iter()
            .map(|path| PathGrant {
                path,
                access: read_only_access,
            })
            .chain(self.read_write.into_iter().map(|path| PathGrant {
                path,
                access: read_write_access,
            }))
            .collect();

        let grants = |ports: Option<Vec<u16>>, access: AccessNet| {
            ports
                .unwrap_or_default()
                .into_iter()
                .map(move |port| PortGrant { port, access })
        };
        let network = grants(self.bind, AccessNet::BIND_TCP)
            .chain(grants(self.connect, AccessNet::CONNECT_TCP))
            .collect();

        RulesetPolicy {
            handled_fs: effective.fs,
            handled_net: effective.net,
            filesystem,
            network,
        }
    }
}

/// Everything needed to build the ruleset, in application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesetPolicy {
    /// Filesystem rights the ruleset handles.
    pub handled_fs: AccessFs,
    /// Network rights the ruleset handles.
    pub handled_net: AccessNet,
    /// Read-only grants followed by read-write grants.
    pub filesystem: Vec<PathGrant>,
    /// Bind grants followed by connect grants.
    pub network: Vec<PortGrant>,
}

fn required_paths(
    snapshot: &EnvSnapshot,
    variable: &'static str,
) -> Result<Vec<PathBuf>, SandboxError> {
    let value = snapshot
        .get(variable)
        .ok_or(SandboxError::MissingConfig { variable })?;
    Ok(parse_delimited_list(value)
        .into_entries()
        .into_iter()
        .map(PathBuf::from)
        .collect())
}

fn optional_ports(
    snapshot: &EnvSnapshot,
    variable: &'static str,
) -> Result<Option<Vec<u16>>, SandboxError> {
    snapshot
        .get(variable)
        .map(|value| parse_port_list(variable, parse_delimited_list(value)))
        .transpose()
}
