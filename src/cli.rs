//! Command-line arguments for harness binaries.
//!
//! The harness ships as a library; a binary embedding it parses
//! [`HarnessArgs`] and calls [`HarnessArgs::resolve`] to get the effective
//! configuration and run seed.

use std::path::PathBuf;

use clap::Parser;

use crate::config::HarnessConfig;
use crate::errors::Result;
use crate::seed::Seed;

#[derive(Debug, Clone, Parser)]
#[command(name = "cluster-harness", about = "Run testsets against a managed cluster.")]
pub struct HarnessArgs {
    /// YAML file with harness settings.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Hex seed (32 digits) to reproduce an earlier run.
    #[arg(long)]
    pub seed: Option<Seed>,

    /// Stream test output instead of capturing it.
    #[arg(short, long)]
    pub verbose: bool,

    #[arg(long)]
    pub no_color: bool,

    /// Report every test as skipped without invoking anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Screen width for status alignment.
    #[arg(long)]
    pub width: Option<usize>,

    /// Start a fresh cluster for every testset.
    #[arg(long)]
    pub no_reuse: bool,

    /// Only run tests whose name contains this string.
    #[arg(long)]
    pub filter: Option<String>,
}

impl HarnessArgs {
    /// Effective configuration (defaults, then `--config`, then flags) and the
    /// run seed, drawn at random when none was given.
    pub fn resolve(&self) -> Result<(HarnessConfig, Seed)> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_yaml_file(path)?,
            None => HarnessConfig::default(),
        };
        if self.verbose {
            config.verbose = true;
        }
        if self.no_color {
            config.use_colors = false;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        let seed = self.seed.unwrap_or_else(Seed::random);
        Ok((config, seed))
    }
}
