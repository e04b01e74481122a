//! Capability negotiation against the host's Landlock ABI.
//!
//! Each ABI version is a strict superset of the previous one. Rather than
//! walking a chain of per-version conditionals, the rights each version
//! introduced are kept in [`INTRODUCED`] and the withdrawn set for a level is
//! the union of every entry above it.

use std::fmt;

use tracing::debug;

use crate::access::{AccessFs, AccessNet};
use crate::error::SandboxError;
use crate::provider::LandlockProvider;

/// Highest Landlock ABI version this launcher knows how to use.
pub const LATEST_ABI: u32 = 4;

struct Introduction {
    level: u32,
    fs: AccessFs,
    net: AccessNet,
}

/// Rights introduced by each ABI version after the first.
const INTRODUCED: [Introduction; 3] = [
    Introduction {
        level: 2,
        fs: AccessFs::REFER,
        net: AccessNet::empty(),
    },
    Introduction {
        level: 3,
        fs: AccessFs::TRUNCATE,
        net: AccessNet::empty(),
    },
    Introduction {
        level: 4,
        fs: AccessFs::empty(),
        net: AccessNet::all(),
    },
];

/// ABI version reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityLevel {
    reported: i32,
}

impl CapabilityLevel {
    /// Wraps the raw version reported by the kernel.
    #[must_use]
    pub const fn new(reported: i32) -> Self {
        Self { reported }
    }

    /// Returns the version exactly as the kernel reported it.
    #[must_use]
    pub const fn reported(self) -> i32 {
        self.reported
    }

    /// Returns the version clamped into `1..=LATEST_ABI`.
    #[must_use]
    pub fn effective(self) -> u32 {
        u32::try_from(self.reported)
            .unwrap_or(1)
            .clamp(1, LATEST_ABI)
    }

    /// Rights the host cannot enforce at this level.
    #[must_use]
    pub fn withdrawn(self) -> (AccessFs, AccessNet) {
        let level = self.effective();
        INTRODUCED
            .iter()
            .filter(|entry| entry.level > level)
            .fold((AccessFs::empty(), AccessNet::empty()), |(fs, net), entry| {
                (fs | entry.fs, net | entry.net)
            })
    }

    /// Advisory to print when the host and launcher disagree on the ABI.
    #[must_use]
    pub fn advisory(self) -> Option<Advisory> {
        let latest = i32::try_from(LATEST_ABI).unwrap_or(i32::MAX);
        match self.reported.cmp(&latest) {
            std::cmp::Ordering::Less => Some(Advisory::UpgradeKernel {
                reported: self.reported,
            }),
            std::cmp::Ordering::Greater => Some(Advisory::UpgradeLauncher {
                reported: self.reported,
            }),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Non-fatal diagnostic raised during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advisory {
    /// The kernel predates [`LATEST_ABI`]; some rights cannot be enforced.
    UpgradeKernel {
        /// Version reported by the host.
        reported: i32,
    },
    /// The kernel offers features this launcher does not use.
    UpgradeLauncher {
        /// Version reported by the host.
        reported: i32,
    },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpgradeKernel { reported } => write!(
                f,
                "you should update the running kernel to leverage Landlock features \
                 provided by ABI version {LATEST_ABI} (instead of {reported})"
            ),
            Self::UpgradeLauncher { reported } => write!(
                f,
                "you should update this launcher to leverage Landlock features \
                 provided by ABI version {reported} (instead of {LATEST_ABI})"
            ),
        }
    }
}

/// Effective masks after degrading a request to the host's capability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveAccess {
    /// Filesystem rights the ruleset will handle.
    pub fs: AccessFs,
    /// Network rights the ruleset will handle.
    pub net: AccessNet,
}

/// Probes the host for its Landlock ABI version.
///
/// # Errors
///
/// Returns [`SandboxError::UnsupportedHost`] when the kernel lacks Landlock,
/// [`SandboxError::FeatureDisabled`] when it is compiled in but turned off,
/// and [`SandboxError::CapabilityQuery`] for any other probe failure.
pub fn query_capability_level<P>(provider: &P) -> Result<CapabilityLevel, SandboxError>
where
    P: LandlockProvider + ?Sized,
{
    let reported = provider
        .abi_version()
        .map_err(SandboxError::from_capability_probe)?;
    debug!(abi = reported, "negotiated Landlock ABI");
    Ok(CapabilityLevel::new(reported))
}

/// Degrades a request to what `level` can enforce.
///
/// The result is always a subset of the request.
#[must_use]
pub fn compute_effective_mask(
    requested_fs: AccessFs,
    requested_net: AccessNet,
    level: CapabilityLevel,
) -> EffectiveAccess {
    let (withdrawn_fs, withdrawn_net) = level.withdrawn();
    EffectiveAccess {
        fs: requested_fs.difference(withdrawn_fs),
        net: requested_net.difference(withdrawn_net),
    }
}
