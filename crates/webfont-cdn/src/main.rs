//! CLI for the web font subset pipeline.

use std::{
    env,
    path::{Path, PathBuf},
    process,
};

use anyhow::{ensure, Context as _};
use clap::{Parser, Subcommand};
use log::{info, warn};
use webfont_cdn::{
    build_index, check_updates, load_updates, save_updates, write_github_output, FleetConfig,
    GitHubReleases, Pipeline, RangeCatalog, VersionLedger,
};

/// Builds CDN-ready Unicode-range web font subsets from upstream font releases.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Checks configured fonts for new upstream releases.
    Check {
        /// Path to the font configuration.
        #[arg(long, default_value = "config/fonts.json")]
        config: PathBuf,
        /// Path to the ledger of processed versions.
        #[arg(long, default_value = "data/versions.json")]
        versions: PathBuf,
        /// Path to write pending updates to.
        #[arg(long, default_value = "data/updates.json")]
        output: PathBuf,
        /// GitHub API token.
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Builds subsets and stylesheets for pending updates.
    Process {
        /// Path to the font configuration.
        #[arg(long, default_value = "config/fonts.json")]
        config: PathBuf,
        /// Path to the Unicode range catalog.
        #[arg(long, default_value = "config/unicode_ranges.json")]
        ranges: PathBuf,
        /// Path to pending updates.
        #[arg(long, default_value = "data/updates.json")]
        updates: PathBuf,
        /// Output directory.
        #[arg(long, default_value = "fonts")]
        output: PathBuf,
        /// Path to the ledger of processed versions.
        #[arg(long, default_value = "data/versions.json")]
        versions: PathBuf,
        /// Maximum number of fonts processed concurrently.
        #[arg(long, default_value_t = 2)]
        threads: usize,
    },
    /// Generates an index of built fonts.
    Index {
        /// Directory with built fonts.
        #[arg(long, default_value = "fonts")]
        fonts_dir: PathBuf,
        /// Path to write the index to; defaults to `index.json` in the fonts directory.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validates the font configuration and the range catalog.
    Validate {
        /// Path to the font configuration.
        #[arg(long, default_value = "config/fonts.json")]
        config: PathBuf,
        /// Path to the Unicode range catalog.
        #[arg(long, default_value = "config/unicode_ranges.json")]
        ranges: PathBuf,
    },
}

impl Command {
    fn run(self) -> anyhow::Result<()> {
        match self {
            Self::Check {
                config,
                versions,
                output,
                token,
            } => {
                let fleet = FleetConfig::load(&config)
                    .with_context(|| format!("failed loading font config {}", config.display()))?;
                let ledger = VersionLedger::load(&versions)?;
                let feed = GitHubReleases::new(token);
                let updates = check_updates(&fleet, &ledger, &feed);

                save_updates(&output, &updates)
                    .with_context(|| format!("failed saving updates to {}", output.display()))?;
                if updates.is_empty() {
                    info!("All fonts are up to date");
                } else {
                    info!(
                        "Found {} font(s) to update; saved to {}",
                        updates.len(),
                        output.display()
                    );
                }

                if let Some(github_output) = env::var_os("GITHUB_OUTPUT") {
                    write_github_output(Path::new(&github_output), &updates)
                        .context("failed writing GitHub Actions output")?;
                }
            }

            Self::Process {
                config,
                ranges,
                updates: updates_path,
                output,
                versions,
                threads,
            } => {
                let updates = load_updates(&updates_path).with_context(|| {
                    format!("failed loading updates {}", updates_path.display())
                })?;
                if updates.is_empty() {
                    info!("No updates to process");
                    return Ok(());
                }

                let fleet = FleetConfig::load(&config)
                    .with_context(|| format!("failed loading font config {}", config.display()))?;
                let catalog = RangeCatalog::load(&ranges)
                    .with_context(|| format!("failed loading range catalog {}", ranges.display()))?;
                if catalog.is_empty() {
                    warn!("Range catalog is empty; no subsets will be built");
                }

                let pipeline = Pipeline::new(fleet, catalog, output);
                let report = pipeline.process_fleet(&updates, threads);

                let mut ledger = VersionLedger::load(&versions)?;
                let recorded = report.update_ledger(&mut ledger);
                ledger.save(&versions)?;
                info!("Recorded {recorded} version(s) in {}", versions.display());

                let failed: Vec<_> = report.failed().map(|update| update.name.as_str()).collect();
                if !failed.is_empty() {
                    warn!("{} font(s) failed and will be retried: {failed:?}", failed.len());
                }
            }

            Self::Index { fonts_dir, output } => {
                let output = output.unwrap_or_else(|| fonts_dir.join("index.json"));
                let index = build_index(&fonts_dir)
                    .with_context(|| format!("failed indexing {}", fonts_dir.display()))?;
                index
                    .save(&output)
                    .with_context(|| format!("failed saving index to {}", output.display()))?;
                let total_files: usize = index.fonts.iter().map(|font| font.total_files).sum();
                let total_size: u64 = index.fonts.iter().map(|font| font.total_size).sum();
                info!(
                    "Indexed {} font(s), {total_files} file(s), {total_size} bytes; saved to {}",
                    index.total_fonts,
                    output.display()
                );
            }

            Self::Validate { config, ranges } => {
                let fleet = FleetConfig::load(&config)
                    .with_context(|| format!("invalid font config {}", config.display()))?;
                let catalog = RangeCatalog::load(&ranges)
                    .with_context(|| format!("invalid range catalog {}", ranges.display()))?;
                ensure!(
                    !catalog.is_empty(),
                    "range catalog {} has no valid entries",
                    ranges.display()
                );

                for font in fleet.fonts() {
                    let variants: Vec<_> = font.variants().iter().map(|v| v.variant()).collect();
                    info!("{} ({}): {variants:?}", font.name(), font.repo());
                }
                info!(
                    "Configuration is valid: {} font(s), {} range(s)",
                    fleet.fonts().len(),
                    catalog.len()
                );
            }
        }
        Ok(())
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(err) = cli.command.run() {
        log::error!("{err:#}");
        process::exit(1);
    }
}
