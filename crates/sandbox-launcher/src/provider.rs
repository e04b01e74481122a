//! Seam between the launcher pipeline and the kernel's Landlock primitives.
//!
//! The pipeline only ever needs five operations: query the ABI version,
//! create a ruleset, add a rule, restrict the calling thread, and set
//! `no_new_privs`. [`LandlockProvider`] names exactly those so tests can stand
//! in for the kernel. [`KernelProvider`] binds them to the `landlock` crate,
//! except for the version probe, which is issued directly so the caller can
//! tell a missing module from a disabled one by its errno.

use std::io;
use std::os::fd::BorrowedFd;
use std::path::Path;

use crate::access::{AccessFs, AccessNet};

/// Rights a ruleset is created to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RulesetAttr {
    /// Filesystem rights the ruleset restricts.
    pub handled_fs: AccessFs,
    /// Network rights the ruleset restricts.
    pub handled_net: AccessNet,
}

/// A single rule registered against a ruleset.
#[derive(Debug, Clone, Copy)]
pub enum Rule<'a> {
    /// Grants `access` beneath the file hierarchy rooted at `parent`.
    PathBeneath {
        /// Path the handle was opened from, kept for diagnostics.
        path: &'a Path,
        /// `O_PATH` handle to the rule target.
        parent: BorrowedFd<'a>,
        /// Rights granted beneath the target.
        access: AccessFs,
    },
    /// Grants `access` on a TCP port.
    NetPort {
        /// Port number.
        port: u16,
        /// Single network right granted on the port.
        access: AccessNet,
    },
}

/// The Landlock primitives consumed by the launcher.
///
/// Implementations own the kernel-side ruleset object through
/// [`LandlockProvider::Ruleset`]; dropping that value releases it.
pub trait LandlockProvider {
    /// Owned handle to a kernel-side ruleset.
    type Ruleset;

    /// Returns the highest Landlock ABI version supported by the host.
    ///
    /// # Errors
    ///
    /// Returns the system error reported by the probe, `ENOSYS` when the
    /// kernel lacks Landlock and `EOPNOTSUPP` when it is disabled.
    fn abi_version(&self) -> io::Result<i32>;

    /// Creates a ruleset handling exactly the rights in `attr`.
    ///
    /// # Errors
    ///
    /// Returns the system error when the kernel rejects the ruleset.
    fn create_ruleset(&self, attr: RulesetAttr) -> io::Result<Self::Ruleset>;

    /// Registers `rule` against `ruleset`.
    ///
    /// # Errors
    ///
    /// Returns the system error when the kernel rejects the rule.
    fn add_rule(&self, ruleset: &mut Self::Ruleset, rule: Rule<'_>) -> io::Result<()>;

    /// Forbids privilege elevation for this process and its descendants.
    ///
    /// # Errors
    ///
    /// Returns the system error reported by `prctl`.
    fn set_no_new_privs(&self) -> io::Result<()>;

    /// Confines the calling thread to `ruleset`, consuming and releasing it.
    ///
    /// # Errors
    ///
    /// Returns the system error reported by `landlock_restrict_self`.
    fn restrict_self(&self, ruleset: Self::Ruleset) -> io::Result<()>;
}

/// Binds [`LandlockProvider`] to the host kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelProvider;

#[cfg(target_os = "linux")]
mod linux {
    use std::io;
    use std::ptr;

    use landlock::{
        BitFlags, CompatLevel, Compatible as _, NetPort, PathBeneath, Ruleset,
        RulesetAttr as _, RulesetCreated, RulesetCreatedAttr as _, RulesetStatus,
    };
    use libc::c_ulong;

    use super::{KernelProvider, LandlockProvider, Rule, RulesetAttr};
    use crate::access::{AccessFs, AccessNet};

    const LANDLOCK_CREATE_RULESET_VERSION: u32 = 1 << 0;

    fn fs_rights(access: AccessFs) -> io::Result<BitFlags<landlock::AccessFs>> {
        BitFlags::from_bits(access.bits()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "unknown filesystem right")
        })
    }

    fn net_rights(access: AccessNet) -> io::Result<BitFlags<landlock::AccessNet>> {
        BitFlags::from_bits(access.bits())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "unknown network right"))
    }

    impl LandlockProvider for KernelProvider {
        type Ruleset = RulesetCreated;

        fn abi_version(&self) -> io::Result<i32> {
            // SAFETY: a null attribute with size 0 is the documented version probe.
            let ret = unsafe {
                libc::syscall(
                    libc::SYS_landlock_create_ruleset,
                    ptr::null::<u8>(),
                    0_usize,
                    LANDLOCK_CREATE_RULESET_VERSION,
                )
            };
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }
            i32::try_from(ret).map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
        }

        fn create_ruleset(&self, attr: RulesetAttr) -> io::Result<RulesetCreated> {
            let mut ruleset = Ruleset::default()
                .set_compatibility(CompatLevel::HardRequirement)
                .handle_access(fs_rights(attr.handled_fs)?)
                .map_err(io::Error::other)?;
            if !attr.handled_net.is_empty() {
                ruleset = ruleset
                    .handle_access(net_rights(attr.handled_net)?)
                    .map_err(io::Error::other)?;
            }
            ruleset.create().map_err(io::Error::other)
        }

        fn add_rule(&self, ruleset: &mut RulesetCreated, rule: Rule<'_>) -> io::Result<()> {
            match rule {
                Rule::PathBeneath { parent, access, .. } => ruleset.add_rule(
                    PathBeneath::new(parent, fs_rights(access)?)
                        .set_compatibility(CompatLevel::HardRequirement),
                ),
                Rule::NetPort { port, access } => ruleset.add_rule(
                    NetPort::new(port, net_rights(access)?)
                        .set_compatibility(CompatLevel::HardRequirement),
                ),
            }
            .map(drop)
            .map_err(io::Error::other)
        }

        fn set_no_new_privs(&self) -> io::Result<()> {
            // SAFETY: PR_SET_NO_NEW_PRIVS takes integer arguments only.
            let ret = unsafe {
                libc::prctl(
                    libc::PR_SET_NO_NEW_PRIVS,
                    c_ulong::from(1_u8),
                    c_ulong::from(0_u8),
                    c_ulong::from(0_u8),
                    c_ulong::from(0_u8),
                )
            };
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        fn restrict_self(&self, ruleset: RulesetCreated) -> io::Result<()> {
            let status = ruleset
                .set_no_new_privs(false)
                .restrict_self()
                .map_err(io::Error::other)?;
            if status.ruleset == RulesetStatus::NotEnforced {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "the ruleset was not enforced",
                ));
            }
            Ok(())
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod unsupported {
    use std::io;

    use super::{KernelProvider, LandlockProvider, Rule, RulesetAttr};

    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "Landlock is only available on Linux",
        )
    }

    impl LandlockProvider for KernelProvider {
        type Ruleset = ();

        fn abi_version(&self) -> io::Result<i32> {
            Err(unsupported())
        }

        fn create_ruleset(&self, _attr: RulesetAttr) -> io::Result<()> {
            Err(unsupported())
        }

        fn add_rule(&self, _ruleset: &mut (), _rule: Rule<'_>) -> io::Result<()> {
            Err(unsupported())
        }

        fn set_no_new_privs(&self) -> io::Result<()> {
            Err(unsupported())
        }

        fn restrict_self(&self, _ruleset: ()) -> io::Result<()> {
            Err(unsupported())
        }
    }
}
