//! CLI command definitions using clap

use aerial_e2e::config::{Role, DEFAULT_SESSION_FILE};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// aerial: operator commands for the Aerial end-to-end suite
#[derive(Parser, Debug)]
#[command(name = "aerial")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log filter implied by `-q` / `-v`
    #[must_use]
    pub const fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "aerial_e2e=info,aerial=info",
            1 => "aerial_e2e=debug,aerial=debug",
            _ => "trace",
        }
    }
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the resolved environment with secrets masked
    Env(EnvArgs),

    /// Log in and write a stored session for the browser tests
    Session(SessionArgs),

    /// Query the volume calculation service
    Vcm(VcmArgs),
}

/// Arguments for the env command
#[derive(Args, Debug)]
pub struct EnvArgs {
    /// Print as a JSON object
    #[arg(long)]
    pub json: bool,

    /// Fail unless every variable a live browser run needs is set
    #[arg(long)]
    pub check: bool,
}

/// Arguments for the session command
#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Where to write the storage state
    #[arg(short, long, default_value = DEFAULT_SESSION_FILE)]
    pub out: PathBuf,

    /// Account to log in as
    #[arg(long, value_enum, default_value = "default")]
    pub role: RoleArg,

    /// Log in through the API or through the login page
    #[arg(long, value_enum, default_value = "api")]
    pub via: LoginVia,

    /// Show the browser window (with --via ui)
    #[arg(long)]
    pub headed: bool,
}

/// Account selector
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RoleArg {
    /// `EMAIL` / `PASSWORD`
    #[default]
    Default,
    /// `V2B_EMAIL` / `V2B_PASSWORD`
    V2b,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Default => Self::Default,
            RoleArg::V2b => Self::V2b,
        }
    }
}

/// How the session is established
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoginVia {
    /// POST the token endpoint and store the token for the app origin
    #[default]
    Api,
    /// Drive the login page in Chromium (needs the `browser` feature)
    Ui,
}

/// Arguments for the vcm command
#[derive(Args, Debug)]
pub struct VcmArgs {
    /// Query to run
    #[command(subcommand)]
    pub command: VcmCommand,
}

/// Volume service queries
#[derive(Subcommand, Debug)]
pub enum VcmCommand {
    /// Print the length reported for a content id
    Length {
        /// Content id on the volume service
        content_id: String,
    },
}
