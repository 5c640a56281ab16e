use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "shardfs",
    about = "Content-addressed file store with digest-sharded directories",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store root directory
    #[arg(short, long, global = true, default_value = ".", env = "SHARDFS_ROOT")]
    pub root: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a store, or show the config of an existing one
    Init(InitArgs),
    /// Store files and print their digests
    Add(AddArgs),
    /// Write the content of an object to stdout or a file
    Get(GetArgs),
    /// Print the path an object lives at
    Path(DigestArgs),
    /// Exit successfully if an object is stored
    Exists(DigestArgs),
    /// Remove an object
    Rm(DigestArgs),
    /// Verify that an object still matches its digest
    Check(DigestArgs),
    /// Verify every object and list the corrupted ones
    Fsck(FsckArgs),
    /// List the digests of all objects
    Ls(LsArgs),
    /// Show object count and total size
    Stats,
    /// Show the store configuration
    Config,
}

#[derive(Args)]
pub struct InitArgs {
    /// Number of shard directory levels
    #[arg(long, allow_negative_numbers = true)]
    pub depth: Option<i64>,
    /// Digest function (md5, sha1, sha224, sha256, sha384, sha512)
    #[arg(long)]
    pub hash_alg: Option<String>,
    /// Octal mode of stored files
    #[arg(long)]
    pub fmode: Option<String>,
    /// Octal mode of tree directories
    #[arg(long)]
    pub dmode: Option<String>,
}

#[derive(Args)]
pub struct AddArgs {
    /// Files to store; `-` reads standard input
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct GetArgs {
    pub digest: String,
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct DigestArgs {
    pub digest: String,
}

#[derive(Args)]
pub struct FsckArgs {
    /// Remove corrupted objects
    #[arg(long)]
    pub delete: bool,
}

#[derive(Args)]
pub struct LsArgs {
    /// Also print the size and path of each object
    #[arg(short, long)]
    pub long: bool,
}
