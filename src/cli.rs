use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug, serde::Serialize)]
#[command(
    name = "rezip",
    version,
    disable_version_flag = true,
    about = "Rebuild ZIP archives with Zopfli-recompressed DEFLATE entries",
    long_about = "Re-encodes every DEFLATE entry of the given ZIP archives with a slow, \
high-ratio encoder while preserving names, timestamps, attributes, CRCs and ZipCrypto \
encryption. Only the compressed bytes and the offsets that depend on them change."
)]
pub struct Cli {
    /// ZIP archives to recompress
    #[arg(value_name = "ZIP", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Maximum number of blocks to split into (0 = unlimited)
    #[arg(short = 'b', long = "block-split-max", value_name = "N", default_value_t = 15)]
    pub block_split_max: u32,

    /// Number of forward/backward optimization passes per block
    #[arg(short = 'i', long = "num-iteration", value_name = "N", default_value_t = 15)]
    pub num_iteration: u32,

    /// Worker pool size; values <= 0 mean unlimited (defaults to the CPU count)
    #[arg(
        short = 'n',
        long = "num-thread",
        value_name = "N",
        allow_negative_numbers = true
    )]
    pub num_thread: Option<i64>,

    /// Adopt the recompressed payload even when it is not smaller
    #[arg(short = 'r', long = "replace-force")]
    pub replace_force: bool,

    /// Process archives but write no files
    #[arg(short = 'd', long = "dry-run")]
    pub dry_run: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Very verbose logging, including per-entry encoder statistics
    #[arg(short = 'V', long = "verbose-more")]
    pub verbose_more: bool,

    /// Disable block splitting in the encoder
    #[arg(long = "no-block-split")]
    pub no_block_split: bool,

    /// Write `<stem>.zopfli.zip` next to each input instead of replacing it
    #[arg(long = "no-overwrite")]
    pub no_overwrite: bool,

    /// Password for ZipCrypto-encrypted entries
    #[arg(long = "password", value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Print version
    #[arg(long = "version", action = ArgAction::Version)]
    pub version: Option<bool>,
}
