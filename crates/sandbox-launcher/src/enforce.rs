//! Drives the launch pipeline from negotiation to process-image handoff.
//!
//! ```text
//! Unconfigured → CapabilityNegotiated → PolicyCompiled → RulesetBuilt
//!   → PrivilegesLocked → RulesetEnforced → Execed
//! ```
//!
//! Any stage may move to `Failed` on its first error. Both terminal stages
//! are final: a failed launcher never retries and never runs the target.

use std::ffi::OsString;
use std::io::{self, Write};
use std::os::unix::process::CommandExt;
use std::process::Command;

use tracing::{debug, error, info};

use crate::abi::query_capability_level;
use crate::config::POLICY_VARIABLES;
use crate::env::EnvSnapshot;
use crate::error::SandboxError;
use crate::policy::PolicyRequest;
use crate::provider::LandlockProvider;
use crate::ruleset::build_ruleset;

/// Position of a [`Launcher`] in the launch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing has happened yet.
    Unconfigured,
    /// The host ABI version is known.
    CapabilityNegotiated,
    /// The environment lists have been compiled into a policy.
    PolicyCompiled,
    /// Every rule has been registered.
    RulesetBuilt,
    /// `no_new_privs` is set.
    PrivilegesLocked,
    /// The current process is confined.
    RulesetEnforced,
    /// The target command has replaced this process.
    Execed,
    /// A step failed; the target will not run.
    Failed,
}

/// The command to run once the sandbox is in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Program name or path, resolved through `PATH` when relative.
    pub program: OsString,
    /// Arguments passed after the program name.
    pub arguments: Vec<OsString>,
    /// Environment the target inherits.
    pub environment: EnvSnapshot,
}

impl LaunchCommand {
    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.arguments)
            .env_clear()
            .envs(self.environment.iter());
        command
    }
}

/// Replaces the current process image with a command.
pub trait ProcessImage {
    /// Executes `command` in place of the current process.
    ///
    /// Production implementations only return on failure; an `Ok` is only
    /// ever produced by doubles standing in for a successful exec.
    ///
    /// # Errors
    ///
    /// Returns the system error when the program cannot be executed.
    fn replace(&mut self, command: &LaunchCommand) -> io::Result<()>;
}

/// Replaces the process image through `execvp`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecImage;

impl ProcessImage for ExecImage {
    fn replace(&mut self, command: &LaunchCommand) -> io::Result<()> {
        Err(command.to_command().exec())
    }
}

/// Sequences the pipeline over a provider and a process image.
#[derive(Debug)]
pub struct Launcher<'a, P: ?Sized, I: ?Sized, E: ?Sized> {
    provider: &'a P,
    image: &'a mut I,
    stderr: &'a mut E,
    stage: Stage,
}

impl<'a, P, I, E> Launcher<'a, P, I, E>
where
    P: LandlockProvider + ?Sized,
    I: ProcessImage + ?Sized,
    E: Write + ?Sized,
{
    /// Creates a launcher writing advisories to `stderr`.
    #[must_use]
    pub const fn new(provider: &'a P, image: &'a mut I, stderr: &'a mut E) -> Self {
        Self {
            provider,
            image,
            stderr,
            stage: Stage::Unconfigured,
        }
    }

    /// Current pipeline stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Runs the pipeline and hands off to `program`.
    ///
    /// `snapshot` is the environment captured at startup. The policy
    /// variables are consumed from it and removed from the target's
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any stage. The ruleset handle is
    /// released whichever stage fails.
    pub fn launch(
        &mut self,
        snapshot: &EnvSnapshot,
        program: OsString,
        arguments: Vec<OsString>,
    ) -> Result<(), SandboxError> {
        let result = self.run_pipeline(snapshot, program, arguments);
        if let Err(failure) = &result {
            error!(stage = ?self.stage, error = %failure, "launch aborted");
            self.stage = Stage::Failed;
        }
        result
    }

    fn run_pipeline(
        &mut self,
        snapshot: &EnvSnapshot,
        program: OsString,
        arguments: Vec<OsString>,
    ) -> Result<(), SandboxError> {
        let level = query_capability_level(self.provider)?;
        if let Some(advisory) = level.advisory() {
            let _ = writeln!(self.stderr, "Hint: {advisory}.");
        }
        self.advance(Stage::CapabilityNegotiated);

        let policy = PolicyRequest::compile(snapshot)?.resolve(level);
        self.advance(Stage::PolicyCompiled);

        let built = build_ruleset(self.provider, &policy)?;
        let counts = built.counts();
        info!(paths = counts.paths, ports = counts.ports, "ruleset populated");
        self.advance(Stage::RulesetBuilt);

        self.lock_new_privileges()?;
        self.apply_ruleset(built.into_handle())?;

        let command = LaunchCommand {
            program,
            arguments,
            environment: snapshot.without(POLICY_VARIABLES),
        };
        self.exec(&command)
    }

    /// Irreversibly forbids privilege elevation.
    fn lock_new_privileges(&mut self) -> Result<(), SandboxError> {
        self.provider
            .set_no_new_privs()
            .map_err(|source| SandboxError::PrivilegeLock { source })?;
        self.advance(Stage::PrivilegesLocked);
        Ok(())
    }

    /// Confines the current process. The provider consumes the handle and
    /// releases it whether or not enforcement succeeds.
    fn apply_ruleset(&mut self, ruleset: P::Ruleset) -> Result<(), SandboxError> {
        self.provider
            .restrict_self(ruleset)
            .map_err(|source| SandboxError::RulesetEnforcement { source })?;
        self.advance(Stage::RulesetEnforced);
        Ok(())
    }

    fn exec(&mut self, command: &LaunchCommand) -> Result<(), SandboxError> {
        self.image
            .replace(command)
            .map_err(|source| SandboxError::Exec {
                command: command.program.clone(),
                source,
            })?;
        self.advance(Stage::Execed);
        Ok(())
    }

    fn advance(&mut self, stage: Stage) {
        debug!(from = ?self.stage, to = ?stage, "launch stage");
        self.stage = stage;
    }
}
