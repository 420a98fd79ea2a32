use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::deflate::DeflateOptions;

/// Resolved runtime configuration, built from the parsed command line.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Config {
    pub inputs: Vec<PathBuf>,
    pub deflate: DeflateOptions,
    /// `None` selects the unbounded default executor.
    pub threads: Option<usize>,
    pub replace_force: bool,
    pub dry_run: bool,
    pub overwrite: bool,
    #[serde(skip_serializing)]
    pub password: Option<Vec<u8>>,
    pub verbose: u8,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.inputs.is_empty() {
            anyhow::bail!("at least one input archive must be provided");
        }
        Ok(())
    }

    /// Destination for an input archive when not rewriting in place.
    pub fn suffixed_output(input: &Path) -> PathBuf {
        let mut name = input
            .file_stem()
            .map(|stem| stem.to_os_string())
            .unwrap_or_default();
        name.push(".zopfli.zip");
        input.with_file_name(name)
    }
}

impl TryFrom<Cli> for Config {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> anyhow::Result<Self> {
        let threads = match cli.num_thread {
            Some(n) if n <= 0 => None,
            Some(n) => Some(n as usize),
            None => Some(num_cpus::get()),
        };
        let num_iterations = if cli.num_iteration == 0 {
            eprintln!("warning: --num-iteration must be at least 1, using 1");
            1
        } else {
            cli.num_iteration
        };
        let verbose = if cli.verbose_more {
            2
        } else if cli.verbose {
            1
        } else {
            0
        };

        let config = Self {
            inputs: cli.inputs,
            deflate: DeflateOptions {
                num_iterations,
                block_splitting: !cli.no_block_split,
                block_splitting_max: cli.block_split_max,
                verbose: cli.verbose,
                verbose_more: cli.verbose_more,
            },
            threads,
            replace_force: cli.replace_force,
            dry_run: cli.dry_run,
            overwrite: !cli.no_overwrite,
            password: cli.password.map(String::into_bytes),
            verbose,
        };
        config.validate()?;
        Ok(config)
    }
}
