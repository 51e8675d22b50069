pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "keel")]
#[command(about = "Join a Keel server to its cluster and inspect join secrets")]
pub struct Args {
    /// Path to the keel config directory (defaults to ~/.keel)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
