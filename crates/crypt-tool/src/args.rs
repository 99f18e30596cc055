//! Command-line interface.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "crypt-tool")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(arg_required_else_help = true)]
#[command(about = "Encrypt, decrypt, and hash record values with the configured secrets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Encrypt a value under the current secret (reads stdin when omitted)
    Encrypt {
        text: Option<String>,
    },
    /// Decrypt an envelope written under the given secret version
    Decrypt {
        /// Secret version stored alongside the envelope
        #[arg(short = 'v', long = "secret-version", default_value_t = 0)]
        secret_version: u32,

        /// `<tag>:<payload>` envelope (reads stdin when omitted)
        envelope: Option<String>,
    },
    /// Print the searchable-key hash of a value for ENVIRONMENT_ID
    Hash {
        value: String,
    },
    /// Resolve the secrets file and round-trip a test record under every version
    Check {},
}
