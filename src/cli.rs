//! This module implements the CLI interface for docs-publish: command parsing,
//! file selection, and the user-visible summary of each run.
//!
//! All pipeline logic lives in [`crate::publish`] and [`crate::check`]; this
//! module is strictly glue.
//!
//! ## How To Use
//! - For command-line users: use the installed `docs-publish` binary with `--help`.
//! - For programmatic/integration use: call [`run`] with a constructed [`Cli`].

use crate::check::check_links;
use crate::files::select_documents;
use crate::load_config::load_config;
use crate::publish::{publish, PublishReport};
use crate::store::HttpStore;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for docs-publish: upload a documentation tree to the content store.
#[derive(Parser)]
#[clap(
    name = "docs-publish",
    version,
    about = "Publish a documentation tree to a content-addressable store"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload documents and assets, then point every document path at its content
    Publish(Selection),
    /// Check that root-relative links between documents resolve
    Check(Selection),
}

/// File selection shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Selection {
    /// Log skipped uploads and already-set pointers too
    #[clap(short, long)]
    pub verbose: bool,
    /// Path to the YAML config file
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// Files to process, rooted under the docs directory (default: the whole tree)
    pub files: Vec<String>,
}

impl Cli {
    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Publish(sel) | Commands::Check(sel) => sel.verbose,
        }
    }
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Publish(sel) => {
            let config = load_config(sel.config.as_deref())?;
            let files = select_documents(&config.docs_dir, &config.private_prefix, &sel.files)?;
            let store = HttpStore::new(&config.store)
                .map_err(|e| anyhow::anyhow!("Failed to construct store client: {e}"))?;
            tracing::info!(command = "publish", files = files.len(), "Starting publish");
            match publish(&config, Arc::new(store), files).await {
                Ok(report) => {
                    print_report(&report);
                    println!("ALL DONE");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "publish", error = %e, "Publish failed");
                    Err(e.into())
                }
            }
        }
        Commands::Check(sel) => {
            let config = load_config(sel.config.as_deref())?;
            let files = select_documents(&config.docs_dir, &config.private_prefix, &sel.files)?;
            println!("checking docs");
            let report = check_links(&config.docs_dir, &files).await?;
            for link in &report.broken {
                println!("{}: broken link {}", link.file, link.target);
            }
            println!(
                "checked {} documents, {} broken links",
                report.checked,
                report.broken.len()
            );
            Ok(())
        }
    }
}

fn print_report(report: &PublishReport) {
    println!(
        "{} files: {} uploaded, {} pointers set, {} failed",
        report.files.len(),
        report.uploaded(),
        report.pointers_set(),
        report.failures.len()
    );
    for failure in &report.failures {
        println!("failed: {} ({})", failure.path, failure.reason);
    }
    for path in &report.unused_assets {
        println!("unused: {path}");
    }
}
