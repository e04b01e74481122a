//! Command-line interface definition.

use std::ffi::OsString;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

const ENVIRONMENT_HELP: &str = "\
Environment variables containing paths and ports, each separated by a colon:
  LL_FS_RO        paths allowed to be used in a read-only way (required)
  LL_FS_RW        paths allowed to be used in a read-write way (required)
  LL_TCP_BIND     ports allowed to bind as a server (optional)
  LL_TCP_CONNECT  ports allowed to connect to as a client (optional)

An empty value restricts the category without allowing anything.

Example:
  LL_FS_RO=\"/bin:/lib:/usr:/proc:/etc:/dev/urandom\" \\
  LL_FS_RW=\"/dev/null:/dev/full:/dev/zero:/dev/pts:/tmp\" \\
  LL_TCP_BIND=\"9418\" LL_TCP_CONNECT=\"80:443\" \\
  sandbox-launcher bash -i";

/// Launch a command in a restricted environment.
#[derive(Parser, Debug)]
#[command(name = "sandbox-launcher", version, after_help = ENVIRONMENT_HELP)]
pub(crate) struct Cli {
    /// Program to execute inside the sandbox, followed by its arguments.
    ///
    /// Everything after the program is forwarded verbatim, including flags
    /// the launcher itself would otherwise recognise.
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<OsString>,
}

impl Cli {
    /// Splits the invocation into the program and its arguments.
    ///
    /// # Errors
    ///
    /// Returns a usage error when no program was supplied.
    pub(crate) fn into_invocation(self) -> Result<(OsString, Vec<OsString>), clap::Error> {
        let mut words = self.command.into_iter();
        let program = words.next().ok_or_else(|| {
            Self::command().error(
                ErrorKind::MissingRequiredArgument,
                "a command to execute is required",
            )
        })?;
        Ok((program, words.collect()))
    }
}
