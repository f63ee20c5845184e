//! Line-oriented front-end
//!
//! Installs one model and prints each progress line to stdout under an
//! indicatif spinner. Used for `install <model>` and non-interactive runs.

use crate::channel::{ProgressChannel, PROGRESS_EVENT};
use crate::tui::{SPINNER, TICK};
use crate::view::InstallerView;
use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Install `model` and print each progress line until the marker arrives
pub async fn run_plain(channel: &dyn ProgressChannel, model: &str) -> Result<()> {
    let mut view = InstallerView::new();
    view.set_model_name(model);

    let mut progress = channel.subscribe(PROGRESS_EVENT);
    view.start_install(channel)?;
    if !view.is_installing() {
        println!("Nothing to install: model name is empty.");
        return Ok(());
    }

    for line in view.progress() {
        println!("  {}", line.dimmed());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("  {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER),
    );
    spinner.set_message(format!("Installing {}", model));
    spinner.enable_steady_tick(TICK);

    while view.is_installing() {
        match progress.recv().await {
            Some(line) => {
                spinner.println(format!("  {}", line));
                view.on_progress_message(line);
            }
            None => {
                spinner.abandon_with_message("connection lost".red().to_string());
                anyhow::bail!("Connection lost before installation completed");
            }
        }
    }

    spinner.finish_and_clear();
    println!("\n  {} {} installed", "✓".green(), model.bold());
    info!(model, lines = view.progress().len(), "plain install finished");
    Ok(())
}
