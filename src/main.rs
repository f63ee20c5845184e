//! model-installer CLI
//!
//! Commands:
//!   (none)   - Interactive dashboard (prompts on stdin when not a terminal)
//!   install  - Install a model and stream progress to stdout
//!   generate - Ask the generator service for an environment script or playbook
//!   config   - Show or update the stored endpoints and namespace

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use model_installer::channel::spawn_scripted_peer;
use model_installer::config::{app_dir, ENDPOINT_ENV, GENERATOR_ENV};
use model_installer::{
    init_logging, run_dashboard, run_plain, Config, GenerateError, LogTarget, MemoryChannel,
    ProgressChannel, ScriptClient, ScriptKind, SocketIoChannel,
};

/// Delay between scripted progress lines in offline mode
const OFFLINE_STEP: Duration = Duration::from_millis(700);

#[derive(Parser)]
#[command(name = "model-installer")]
#[command(about = "Install models through a remote installer and follow its progress")]
#[command(version)]
struct Cli {
    /// Installer endpoint (overrides config and MODEL_INSTALLER_ENDPOINT)
    #[arg(short, long, global = true)]
    endpoint: Option<String>,

    /// Socket.IO namespace to join
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Use a local scripted peer instead of connecting
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a model and print progress until it completes
    Install {
        /// Model name, e.g. llama3
        model: String,
    },

    /// Generate an environment script or a playbook from a description
    Generate {
        #[arg(value_enum)]
        kind: GenerateKind,

        /// Requirements, e.g. "Python 3.8 with pandas and numpy"
        requirements: Vec<String>,

        /// Generator service address (overrides config and MODEL_INSTALLER_GENERATOR)
        #[arg(long)]
        generator: Option<String>,
    },

    /// Show config, or update it when flags are given
    Config {
        /// New endpoint to store
        #[arg(long = "set-endpoint")]
        set_endpoint: Option<String>,

        /// New namespace to store
        #[arg(long = "set-namespace")]
        set_namespace: Option<String>,

        /// New generator endpoint to store
        #[arg(long = "set-generator-endpoint")]
        set_generator_endpoint: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GenerateKind {
    Environment,
    Playbook,
}

impl From<GenerateKind> for ScriptKind {
    fn from(kind: GenerateKind) -> Self {
        match kind {
            GenerateKind::Environment => ScriptKind::Environment,
            GenerateKind::Playbook => ScriptKind::Playbook,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let model = match cli.command {
        Some(Commands::Config {
            set_endpoint,
            set_namespace,
            set_generator_endpoint,
        }) => return run_config(set_endpoint, set_namespace, set_generator_endpoint),
        Some(Commands::Generate {
            kind,
            requirements,
            generator,
        }) => {
            init_logging(LogTarget::Stderr)?;
            return run_generate(kind.into(), &requirements.join(" "), generator).await;
        }
        Some(Commands::Install { model }) => Some(model),
        None => None,
    };

    let config = Config::load()?.with_overrides(
        cli.endpoint,
        cli.namespace,
        std::env::var(ENDPOINT_ENV).ok(),
    );

    let interactive = model.is_none() && std::io::stdout().is_terminal();
    if interactive {
        init_logging(LogTarget::File(app_dir()?.join("model-installer.log")))?;
    } else {
        init_logging(LogTarget::Stderr)?;
    }

    let model = match model {
        Some(model) => Some(model),
        None if !interactive => Some(prompt_model()?),
        None => None,
    };

    if cli.offline {
        let channel = Arc::new(MemoryChannel::new());
        let peer = spawn_scripted_peer(Arc::clone(&channel), OFFLINE_STEP);
        let result = run_frontend(channel.as_ref(), "offline", model).await;
        channel.close();
        peer.abort();
        return result;
    }

    let channel = match SocketIoChannel::connect(&config.endpoint, &config.namespace).await {
        Ok(channel) => channel,
        Err(e) => {
            eprintln!("\n{} could not reach {}\n", "Error:".red(), config.endpoint);
            eprintln!("Set the installer address with:");
            eprintln!("  {}", "model-installer config --set-endpoint <URL>".cyan());
            eprintln!("or try the interface without a server:");
            eprintln!("  {}\n", "model-installer --offline".cyan());
            return Err(e).context("Failed to connect to progress channel");
        }
    };

    let result = run_frontend(&channel, &config.endpoint, model).await;
    channel.disconnect().await;
    result
}

async fn run_frontend(
    channel: &dyn ProgressChannel,
    endpoint: &str,
    model: Option<String>,
) -> Result<()> {
    match model {
        Some(model) => run_plain(channel, &model).await,
        None => run_dashboard(channel, endpoint).await,
    }
}

/// Read a model name from stdin for non-interactive runs
fn prompt_model() -> Result<String> {
    print!("Model name: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read model name")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn run_generate(
    kind: ScriptKind,
    requirements: &str,
    generator: Option<String>,
) -> Result<()> {
    let config = Config::load()?
        .with_generator_override(generator, std::env::var(GENERATOR_ENV).ok());
    let client = ScriptClient::new(&config.generator_endpoint)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Generating {}...", kind.label()));
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = client.generate(kind, requirements).await;
    spinner.finish_and_clear();

    match result {
        Ok(script) => {
            println!("{}\n", format!("Generated {}", kind.label()).bold());
            println!("{}", script);
            let hint = match kind {
                ScriptKind::Environment => "save it as a .sh file in your environment directory",
                ScriptKind::Playbook => "save it as a .sh file in your playbooks directory",
            };
            println!("\n{}", format!("Copy this script and {}.", hint).dimmed());
            Ok(())
        }
        Err(e @ GenerateError::EmptyRequirements(_)) => {
            println!("{} {}", "Warning:".yellow(), e);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            Err(e).with_context(|| format!("Generator at {} failed", config.generator_endpoint))
        }
    }
}

fn run_config(
    set_endpoint: Option<String>,
    set_namespace: Option<String>,
    set_generator_endpoint: Option<String>,
) -> Result<()> {
    let path = Config::path()?;
    let changed =
        set_endpoint.is_some() || set_namespace.is_some() || set_generator_endpoint.is_some();
    let config = Config::load()?
        .with_overrides(set_endpoint, set_namespace, None)
        .with_generator_override(set_generator_endpoint, None);

    if changed {
        model_installer::channel::websocket_url(&config.endpoint)?;
        ScriptClient::new(&config.generator_endpoint)?;
        config.save()?;
        println!("Saved {}", path.display());
    }

    println!("Endpoint:  {}", config.endpoint);
    println!("Namespace: {}", config.namespace);
    println!("Generator: {}", config.generator_endpoint);
    for (var, what) in [(ENDPOINT_ENV, "endpoint"), (GENERATOR_ENV, "generator")] {
        if let Ok(env) = std::env::var(var) {
            println!(
                "{}",
                format!("({} is set and overrides the {}: {})", var, what, env).dimmed()
            );
        }
    }

    Ok(())
}
