//! Binary entrypoint for `sandbox-launcher`.
//!
//! Delegates to [`sandbox_launcher::run`], which only returns when the launch
//! fails; a successful launch replaces this process with the target command.

use std::io::{self, StderrLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    sandbox_launcher::run(std::env::args_os(), &mut stderr)
}
