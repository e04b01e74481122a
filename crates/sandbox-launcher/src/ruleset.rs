//! Populates a Landlock ruleset from a compiled policy.
//!
//! Rules are registered in a fixed order: read-only paths, read-write paths,
//! bind ports, connect ports. The first failure aborts the build and drops
//! the ruleset handle, so a partially populated ruleset never reaches the
//! enforcer.

use std::fs::{File, OpenOptions};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::access::{AccessFs, AccessNet};
use crate::error::{PathOperation, RuleTarget, SandboxError};
use crate::policy::{PathGrant, PortGrant, RulesetPolicy};
use crate::provider::{LandlockProvider, Rule, RulesetAttr};

/// A path rule with its target held open for the duration of registration.
#[derive(Debug)]
pub struct FilesystemRule {
    path: PathBuf,
    handle: File,
    access: AccessFs,
}

impl FilesystemRule {
    /// Opens `grant.path` and restricts its rights to the target's file type.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::InvalidPath`] when the path cannot be opened
    /// or its type cannot be determined.
    pub fn open(grant: &PathGrant) -> Result<Self, SandboxError> {
        let handle = open_path(&grant.path)?;
        let metadata = handle
            .metadata()
            .map_err(|source| SandboxError::InvalidPath {
                path: grant.path.clone(),
                operation: PathOperation::Stat,
                source,
            })?;
        Ok(Self {
            path: grant.path.clone(),
            handle,
            access: grant.access.for_target(metadata.is_dir()),
        })
    }

    /// Path the rule was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rights the rule grants after file-type restriction.
    #[must_use]
    pub const fn access(&self) -> AccessFs {
        self.access
    }

    fn as_rule(&self) -> Rule<'_> {
        Rule::PathBeneath {
            path: &self.path,
            parent: self.handle.as_fd(),
            access: self.access,
        }
    }
}

fn open_path(path: &Path) -> Result<File, SandboxError> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_PATH | libc::O_CLOEXEC)
        .open(path)
        .map_err(|source| SandboxError::InvalidPath {
            path: path.to_path_buf(),
            operation: PathOperation::Open,
            source,
        })
}

/// Number of rules registered per category.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RuleCounts {
    /// Path rules registered.
    pub paths: usize,
    /// Port rules registered.
    pub ports: usize,
}

/// A populated ruleset ready to hand to the enforcer.
#[derive(Debug)]
pub struct BuiltRuleset<R> {
    ruleset: R,
    counts: RuleCounts,
}

impl<R> BuiltRuleset<R> {
    /// Rules registered while building.
    #[must_use]
    pub const fn counts(&self) -> RuleCounts {
        self.counts
    }

    /// Releases ownership of the ruleset handle.
    #[must_use]
    pub fn into_handle(self) -> R {
        self.ruleset
    }
}

/// Allocates a ruleset handling exactly the negotiated rights.
///
/// # Errors
///
/// Returns [`SandboxError::RulesetCreation`] when the kernel refuses.
pub fn create_ruleset<P>(
    provider: &P,
    handled_fs: AccessFs,
    handled_net: AccessNet,
) -> Result<P::Ruleset, SandboxError>
where
    P: LandlockProvider + ?Sized,
{
    provider
        .create_ruleset(RulesetAttr {
            handled_fs,
            handled_net,
        })
        .map_err(|source| SandboxError::RulesetCreation { source })
}

/// Registers one path rule per grant, in order.
///
/// Each target is opened, classified and closed again before the next grant
/// is processed.
///
/// # Errors
///
/// Returns [`SandboxError::InvalidPath`] or [`SandboxError::RuleAddition`]
/// for the first grant that fails. No later grant is attempted.
pub fn add_filesystem_rules<P>(
    provider: &P,
    ruleset: &mut P::Ruleset,
    grants: &[PathGrant],
) -> Result<usize, SandboxError>
where
    P: LandlockProvider + ?Sized,
{
    for grant in grants {
        let rule = FilesystemRule::open(grant)?;
        provider
            .add_rule(ruleset, rule.as_rule())
            .map_err(|source| SandboxError::RuleAddition {
                target: RuleTarget::Path(grant.path.clone()),
                source,
            })?;
        debug!(path = %rule.path().display(), access = ?rule.access(), "added path rule");
    }
    Ok(grants.len())
}

/// Registers one port rule per grant, in order.
///
/// # Errors
///
/// Returns [`SandboxError::UnhandledNetworkRight`] when a grant's right is
/// not handled by the ruleset, which happens when the host predates network
/// rules, and [`SandboxError::RuleAddition`] when the kernel rejects a port.
/// Either names the first failing port; no later grant is attempted.
pub fn add_network_rules<P>(
    provider: &P,
    ruleset: &mut P::Ruleset,
    handled_net: AccessNet,
    grants: &[PortGrant],
) -> Result<usize, SandboxError>
where
    P: LandlockProvider + ?Sized,
{
    for grant in grants {
        if !handled_net.contains(grant.access) {
            return Err(SandboxError::UnhandledNetworkRight { port: grant.port });
        }
        provider
            .add_rule(
                ruleset,
                Rule::NetPort {
                    port: grant.port,
                    access: grant.access,
                },
            )
            .map_err(|source| SandboxError::RuleAddition {
                target: RuleTarget::Port(grant.port),
                source,
            })?;
        debug!(port = grant.port, access = ?grant.access, "added port rule");
    }
    Ok(grants.len())
}

/// Creates and fully populates a ruleset for `policy`.
///
/// # Errors
///
/// Propagates the first creation or registration failure. The partially
/// built ruleset is released before returning.
pub fn build_ruleset<P>(
    provider: &P,
    policy: &RulesetPolicy,
) -> Result<BuiltRuleset<P::Ruleset>, SandboxError>
where
    P: LandlockProvider + ?Sized,
{
    let mut ruleset = create_ruleset(provider, policy.handled_fs, policy.handled_net)?;
    let paths = add_filesystem_rules(provider, &mut ruleset, &policy.filesystem)?;
    let ports = add_network_rules(provider, &mut ruleset, policy.handled_net, &policy.network)?;
    Ok(BuiltRuleset {
        ruleset,
        counts: RuleCounts { paths, ports },
    })
}
