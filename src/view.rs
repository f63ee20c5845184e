//! Installer view state
//!
//! Holds the model name being edited, the progress log, and the installing
//! flag. All mutation happens on the event-loop task; the view does no I/O
//! besides emitting through the channel it is handed.

use crate::channel::{ChannelError, ProgressChannel, INSTALL_EVENT};

/// Substring that marks a successful install in a progress message
pub const COMPLETION_MARKER: &str = "Installation complete";

/// First progress entry, shown as soon as an install starts
pub const SEED_MESSAGE: &str = "Generating installation commands...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Installing,
}

#[derive(Debug, Default, Clone)]
pub struct InstallerView {
    model_name: String,
    progress: Vec<String>,
    installing: bool,
}

impl InstallerView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn progress(&self) -> &[String] {
        &self.progress
    }

    pub fn is_installing(&self) -> bool {
        self.installing
    }

    pub fn phase(&self) -> Phase {
        if self.installing {
            Phase::Installing
        } else {
            Phase::Idle
        }
    }

    /// Replace the model name. Last write wins.
    pub fn set_model_name(&mut self, text: impl Into<String>) {
        self.model_name = text.into();
    }

    /// Start an install of the current model name.
    ///
    /// An empty name is a silent no-op. Otherwise the view enters
    /// [`Phase::Installing`], the log is reset to [`SEED_MESSAGE`], and
    /// `install_model` is emitted without waiting for a reply. If the channel
    /// refuses the emission the error is returned and the view stays
    /// installing.
    pub fn start_install(&mut self, channel: &dyn ProgressChannel) -> Result<(), ChannelError> {
        if self.model_name.is_empty() {
            return Ok(());
        }

        self.installing = true;
        self.progress = vec![SEED_MESSAGE.to_string()];
        tracing::info!(model = %self.model_name, "starting install");
        channel.emit(INSTALL_EVENT, &self.model_name)
    }

    /// Append one inbound progress line
    pub fn on_progress_message(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.contains(COMPLETION_MARKER) {
            self.installing = false;
            tracing::info!(message = %text, "install complete");
        }
        self.progress.push(text);
    }

    // Input editing. The field is disabled while installing.

    pub fn push_char(&mut self, c: char) {
        if self.installing {
            return;
        }
        let mut name = std::mem::take(&mut self.model_name);
        name.push(c);
        self.set_model_name(name);
    }

    pub fn pop_char(&mut self) {
        if self.installing {
            return;
        }
        let mut name = std::mem::take(&mut self.model_name);
        name.pop();
        self.set_model_name(name);
    }

    pub fn clear_input(&mut self) {
        if self.installing {
            return;
        }
        self.set_model_name(String::new());
    }
}
