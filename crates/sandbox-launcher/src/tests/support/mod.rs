//! Shared doubles and fixtures for launcher tests.

use std::cell::{Cell, RefCell};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use tempfile::TempDir;

use crate::access::{AccessFs, AccessNet};
use crate::enforce::{LaunchCommand, ProcessImage};
use crate::env::EnvSnapshot;
use crate::provider::{LandlockProvider, Rule, RulesetAttr};

/// Observable effect of a provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Query,
    Create(RulesetAttr),
    AddPath { path: PathBuf, access: AccessFs },
    AddPort { port: u16, access: AccessNet },
    NoNewPrivs,
    RestrictSelf,
    Release,
}

/// Provider step that should fail with `EINVAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Create,
    /// One-based index of the `add_rule` call to reject.
    Rule(usize),
    NoNewPrivs,
    RestrictSelf,
}

type CallLog = Rc<RefCell<Vec<Call>>>;

/// Ruleset handle that records its release.
#[derive(Debug)]
pub struct FakeRuleset {
    log: CallLog,
}

impl Drop for FakeRuleset {
    fn drop(&mut self) {
        self.log.borrow_mut().push(Call::Release);
    }
}

/// Records every primitive call instead of touching the kernel.
#[derive(Debug)]
pub struct FakeProvider {
    abi: Result<i32, i32>,
    fail_at: Option<FailAt>,
    rule_attempts: Cell<usize>,
    log: CallLog,
}

impl FakeProvider {
    pub fn with_abi(abi: i32) -> Self {
        Self {
            abi: Ok(abi),
            fail_at: None,
            rule_attempts: Cell::new(0),
            log: Rc::default(),
        }
    }

    pub fn with_probe_errno(errno: i32) -> Self {
        Self {
            abi: Err(errno),
            ..Self::with_abi(0)
        }
    }

    pub fn failing_at(mut self, step: FailAt) -> Self {
        self.fail_at = Some(step);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    pub fn registered_rules(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::AddPath { .. } | Call::AddPort { .. }))
            .collect()
    }

    pub fn release_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == Call::Release)
            .count()
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }

    fn fails(&self, step: FailAt) -> io::Result<()> {
        if self.fail_at == Some(step) {
            Err(io::Error::from_raw_os_error(libc::EINVAL))
        } else {
            Ok(())
        }
    }
}

impl LandlockProvider for FakeProvider {
    type Ruleset = FakeRuleset;

    fn abi_version(&self) -> io::Result<i32> {
        self.record(Call::Query);
        self.abi.map_err(io::Error::from_raw_os_error)
    }

    fn create_ruleset(&self, attr: RulesetAttr) -> io::Result<FakeRuleset> {
        self.fails(FailAt::Create)?;
        self.record(Call::Create(attr));
        Ok(FakeRuleset {
            log: Rc::clone(&self.log),
        })
    }

    fn add_rule(&self, _ruleset: &mut FakeRuleset, rule: Rule<'_>) -> io::Result<()> {
        let attempt = self.rule_attempts.get() + 1;
        self.rule_attempts.set(attempt);
        self.fails(FailAt::Rule(attempt))?;
        self.record(match rule {
            Rule::PathBeneath { path, access, .. } => Call::AddPath {
                path: path.to_path_buf(),
                access,
            },
            Rule::NetPort { port, access } => Call::AddPort { port, access },
        });
        Ok(())
    }

    fn set_no_new_privs(&self) -> io::Result<()> {
        self.fails(FailAt::NoNewPrivs)?;
        self.record(Call::NoNewPrivs);
        Ok(())
    }

    fn restrict_self(&self, ruleset: FakeRuleset) -> io::Result<()> {
        let outcome = self.fails(FailAt::RestrictSelf);
        if outcome.is_ok() {
            self.record(Call::RestrictSelf);
        }
        drop(ruleset);
        outcome
    }
}

/// Process image that records the handoff instead of exec'ing.
#[derive(Debug, Default)]
pub struct RecordingImage {
    pub launched: Option<LaunchCommand>,
    pub exec_errno: Option<i32>,
}

impl ProcessImage for RecordingImage {
    fn replace(&mut self, command: &LaunchCommand) -> io::Result<()> {
        if let Some(errno) = self.exec_errno {
            return Err(io::Error::from_raw_os_error(errno));
        }
        self.launched = Some(command.clone());
        Ok(())
    }
}

/// Temporary directory tree used as rule targets.
pub struct Fixtures {
    pub root: TempDir,
}

impl Fixtures {
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to allocate temporary directory");
        for dir in ["lib", "usr", "tmp", "etc"] {
            fs::create_dir(root.path().join(dir))
                .unwrap_or_else(|error| panic!("failed to create fixture {dir}: {error}"));
        }
        fs::write(root.path().join("etc/hosts"), "127.0.0.1 localhost\n")
            .expect("failed to write fixture file");
        Self { root }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    /// Joins fixture paths into a colon-delimited variable value.
    pub fn list(&self, relatives: &[&str]) -> OsString {
        let joined: Vec<String> = relatives
            .iter()
            .map(|relative| display(&self.path(relative)))
            .collect();
        OsString::from(joined.join(":"))
    }
}

fn display(path: &Path) -> String {
    path.to_str()
        .unwrap_or_else(|| panic!("fixture path is not UTF-8: {path:?}"))
        .to_owned()
}

/// Outcome of driving [`crate::run_with`] against the doubles.
pub struct RunOutcome {
    pub exit: ExitCode,
    pub stderr: String,
}

pub fn run_launcher(
    args: &[&str],
    snapshot: &EnvSnapshot,
    provider: &FakeProvider,
    image: &mut RecordingImage,
) -> RunOutcome {
    let mut stderr = Vec::new();
    let exit = crate::run_with(
        args.iter().map(OsString::from),
        snapshot,
        provider,
        image,
        &mut stderr,
        || Ok(()),
    );
    RunOutcome {
        exit,
        stderr: String::from_utf8(stderr).expect("stderr utf8"),
    }
}
