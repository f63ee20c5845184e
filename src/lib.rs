//! Model installer client
//!
//! Sends an install request for a model to a remote peer over a Socket.IO
//! channel and follows the streamed progress until the peer reports
//! "Installation complete".
//!
//! - `view`: installer state and its operations
//! - `channel`: the progress channel trait, Socket.IO and in-memory impls
//! - `tui`: full-screen dashboard
//! - `plain`: line-oriented streaming mode
//! - `generate`: HTTP client for environment script and playbook generation

pub mod channel;
pub mod config;
pub mod generate;
pub mod logging;
pub mod plain;
pub mod tui;
pub mod view;

pub use channel::{
    ChannelError, HandlerRegistry, MemoryChannel, ProgressChannel, SocketIoChannel, Subscription,
    INSTALL_EVENT, PROGRESS_EVENT,
};
pub use config::Config;
pub use generate::{GenerateError, ScriptClient, ScriptKind};
pub use logging::{init_logging, LogTarget};
pub use plain::run_plain;
pub use tui::run_dashboard;
pub use view::{InstallerView, Phase, COMPLETION_MARKER, SEED_MESSAGE};
