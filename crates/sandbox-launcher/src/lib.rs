//! Launch a command inside a Landlock sandbox described by the environment.
//!
//! `sandbox-launcher` reads colon-delimited path and port lists from
//! `LL_FS_RO`, `LL_FS_RW`, `LL_TCP_BIND` and `LL_TCP_CONNECT`, negotiates the
//! host's Landlock ABI, builds a ruleset, confines itself and then replaces
//! its process image with the requested command. The confinement is
//! inherited by the command and everything it spawns.
//!
//! Setup is fail-closed: any error while negotiating, compiling, populating
//! or enforcing the ruleset stops the launch before the command runs.
//!
//! The pipeline is split along the same lines as the binary:
//! - [`query_capability_level`] and [`compute_effective_mask`] negotiate the
//!   ABI and degrade the requested rights.
//! - [`PolicyRequest`] compiles the environment snapshot into ordered lists.
//! - [`build_ruleset`] turns those lists into registered rules.
//! - [`Launcher`] locks privileges, enforces the ruleset and execs.
//!
//! Kernel access goes through [`LandlockProvider`], so every stage can be
//! exercised without a Landlock-capable host.

mod abi;
mod access;
mod cli;
mod config;
mod enforce;
mod env;
mod error;
mod logging;
mod policy;
mod provider;
mod ruleset;
pub mod runtime;
mod telemetry;

#[cfg(test)]
mod tests;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tracing::warn;

pub use abi::{
    Advisory, CapabilityLevel, EffectiveAccess, LATEST_ABI, compute_effective_mask,
    query_capability_level,
};
pub use access::{AccessFs, AccessNet};
pub use config::{
    ENV_FS_RO, ENV_FS_RW, ENV_LOG_FILTER, ENV_LOG_FORMAT, ENV_TCP_BIND, ENV_TCP_CONNECT,
    LauncherConfig, POLICY_VARIABLES,
};
pub use enforce::{ExecImage, LaunchCommand, Launcher, ProcessImage, Stage};
pub use env::EnvSnapshot;
pub use error::{PathOperation, RuleTarget, SandboxError};
pub use logging::{LogFormat, LogFormatParseError};
pub use policy::{
    DelimitedList, PathGrant, PolicyRequest, PortGrant, RulesetPolicy, parse_delimited_list,
    parse_port,
};
pub use provider::{KernelProvider, LandlockProvider, Rule, RulesetAttr};
pub use ruleset::{
    BuiltRuleset, FilesystemRule, RuleCounts, add_filesystem_rules, add_network_rules,
    build_ruleset, create_ruleset,
};
pub use telemetry::TelemetryError;

use cli::Cli;

/// Runs the launcher against the host kernel and process environment.
///
/// On success the process image is replaced and this function never
/// returns. Any failure is reported on `stderr` and yields
/// [`ExitCode::FAILURE`].
#[must_use]
pub fn run<I, E>(args: I, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    E: Write,
{
    let snapshot = EnvSnapshot::capture();
    let mut image = ExecImage;
    run_with(
        args,
        &snapshot,
        &KernelProvider,
        &mut image,
        stderr,
        runtime::ensure_single_threaded,
    )
}

/// Runs the launcher with substitutable collaborators.
pub(crate) fn run_with<I, P, M, E, F>(
    args: I,
    snapshot: &EnvSnapshot,
    provider: &P,
    image: &mut M,
    stderr: &mut E,
    preflight: F,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    P: LandlockProvider + ?Sized,
    M: ProcessImage + ?Sized,
    E: Write,
    F: FnOnce() -> Result<(), SandboxError>,
{
    let result = Cli::try_parse_from(args)
        .and_then(Cli::into_invocation)
        .map_err(SandboxError::from)
        .and_then(|(program, arguments)| {
            start_telemetry(snapshot)?;
            preflight()?;
            Launcher::new(provider, image, &mut *stderr).launch(snapshot, program, arguments)
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report(stderr, &error);
            ExitCode::FAILURE
        }
    }
}

fn start_telemetry(snapshot: &EnvSnapshot) -> Result<(), SandboxError> {
    let config = LauncherConfig::from_snapshot(snapshot);
    telemetry::initialise(&config)?;
    if let Some(rejected) = config.rejected_log_format() {
        warn!(value = rejected, "unknown log format; using compact output");
    }
    Ok(())
}

fn report<E: Write>(stderr: &mut E, error: &SandboxError) {
    let _ = writeln!(stderr, "{error}");
    if let Some(hint) = error.hint() {
        let _ = writeln!(stderr, "Hint: {hint}");
    }
}
