//! Sync command - One manual sync with live progress
//!
//! Progress is polled from the engine while the run is in flight and drawn
//! on a single terminal line. Ctrl+C requests a stop; the engine finishes
//! its in-flight chunk writes and reports `stopped`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use lmsync_core::domain::{NewFilesList, SyncEvent};
use tokio::sync::broadcast;

use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat};

const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Args)]
pub struct SyncCommand {}

impl SyncCommand {
    pub async fn execute(&self, config: Option<&Path>, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let ctx = AppContext::load(config)?;

        if !ctx.client.is_logged_in() {
            fmt.error("Not logged in. Run 'lmsync auth login' first");
            return Ok(());
        }

        let engine = Arc::new(ctx.engine());
        let mut events = engine.subscribe();
        let mut run = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run_sync().await }
        });

        let mut ticker = tokio::time::interval(PROGRESS_POLL_INTERVAL);
        let mut stop_requested = false;
        let outcome = loop {
            tokio::select! {
                joined = &mut run => break joined.context("Sync task failed")?,
                _ = tokio::signal::ctrl_c(), if !stop_requested => {
                    stop_requested = true;
                    fmt.warn("Stopping after in-flight writes...");
                    engine.stop();
                }
                _ = ticker.tick() => {
                    if let Some(progress) = engine.current_progress() {
                        fmt.progress(&progress);
                    }
                }
            }
        };

        let new_files = collect_new_files(&mut events);
        fmt.sync_report(outcome, &new_files);

        if outcome.is_success() {
            Ok(())
        } else {
            anyhow::bail!("Sync finished with {outcome}")
        }
    }
}

fn collect_new_files(events: &mut broadcast::Receiver<SyncEvent>) -> NewFilesList {
    let mut new_files = NewFilesList::new();
    loop {
        match events.try_recv() {
            Ok(SyncEvent::NewFiles(files)) => {
                for (course, mut list) in files {
                    new_files.entry(course).or_default().append(&mut list);
                }
            }
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => return new_files,
        }
    }
}
