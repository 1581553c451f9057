//! CLI entry point for switchboard

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use switchboard_agent::{AgentLoop, EchoResponder};
use switchboard_channels::ChannelManager;
use switchboard_core::bus::{InboundMessage, MessageBus};
use switchboard_core::config::{AgentConfig, Config, ConfigLoader, DeliveryMode};
use switchboard_core::logging::{init_logging, TerminalStream};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Message bus gateway between chat channels and an agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    /// Run the gateway: channels, dispatcher and agent loop
    Gateway,
    /// Send one message through the bus and print the reply
    Send {
        /// Message to send
        #[arg(short, long)]
        message: String,
        /// Channel the message appears to come from
        #[arg(long, default_value = "cli")]
        channel: String,
        /// Chat identifier
        #[arg(long, default_value = "direct")]
        chat_id: String,
        /// Sender identifier
        #[arg(long, default_value = "user")]
        sender: String,
    },
    /// Show status information
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };

    match cli.command {
        Commands::Init { force } => {
            run_init(&config_loader, force)?;
        }
        Commands::Gateway => {
            let config = config_loader.load()?;
            let _log_guard = init_logging(&config.logging, gateway_log_stream(&config));
            info!("Starting gateway");
            run_gateway(config).await?;
        }
        Commands::Send {
            message,
            channel,
            chat_id,
            sender,
        } => {
            let config = config_loader.load()?;
            let _log_guard = init_logging(&config.logging, TerminalStream::Stdout);
            run_send(&config, message, channel, chat_id, sender).await?;
        }
        Commands::Status => {
            let config = config_loader.load()?;
            run_status(&config_loader, &config);
        }
    }

    Ok(())
}

fn run_init(loader: &ConfigLoader, force: bool) -> Result<()> {
    let path = loader.config_path();
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    loader.save(&Config::default())?;
    println!(
        "{} {}",
        style("Wrote default config to").green(),
        path.display()
    );
    Ok(())
}

/// The console channel talks over stdout, so gateway logs move to stderr
fn gateway_log_stream(config: &Config) -> TerminalStream {
    TerminalStream::for_console(config.channels.console.enabled)
}

async fn run_gateway(config: Config) -> Result<()> {
    println!("{}", style("Starting Switchboard Gateway...").bold().cyan());
    println!("Delivery: {:?}", config.agent.delivery);
    println!("Dispatch interval: {} ms", config.bus.dispatch_interval_ms);

    let bus = MessageBus::from_config(&config.bus);

    let channel_manager = Arc::new(ChannelManager::new(config.clone(), bus.clone()));
    channel_manager.initialize().await?;
    channel_manager.register_with_bus().await;

    let bus_for_dispatch = bus.clone();
    let dispatch_handle = tokio::spawn(async move {
        bus_for_dispatch.dispatch_outbound().await;
    });

    let agent = Arc::new(AgentLoop::new(
        bus.clone(),
        Arc::new(EchoResponder),
        &config.agent,
    ));
    let shutdown = CancellationToken::new();
    let agent_shutdown = shutdown.clone();
    let agent_handle = tokio::spawn(async move {
        agent.run(agent_shutdown).await;
    });

    channel_manager.start_all().await?;
    let channels = channel_manager.list_channels().await;
    println!("Channels: {}", channels.join(", "));
    println!(
        "\n{}",
        style("Gateway is running. Press Ctrl+C to stop.").green()
    );

    tokio::signal::ctrl_c().await?;
    println!("\n{}", style("Shutting down...").yellow());

    shutdown.cancel();
    if let Err(e) = channel_manager.stop_all().await {
        error!("Failed to stop channels: {}", e);
    }
    bus.stop();

    if let Err(e) = agent_handle.await {
        error!("Agent loop task failed: {}", e);
    }
    if let Err(e) = dispatch_handle.await {
        error!("Dispatcher task failed: {}", e);
    }

    if bus.outbound_size() > 0 {
        println!(
            "{} undelivered outbound message(s) dropped",
            bus.outbound_size()
        );
    }
    println!("{}", style("Gateway stopped.").green());
    Ok(())
}

/// Push one message through the queued path: inbound queue, agent, dispatcher
async fn run_send(
    config: &Config,
    message: String,
    channel: String,
    chat_id: String,
    sender: String,
) -> Result<()> {
    let bus = MessageBus::from_config(&config.bus);
    let agent_config = AgentConfig {
        delivery: DeliveryMode::Queued,
        ..config.agent.clone()
    };
    let agent = AgentLoop::new(bus.clone(), Arc::new(EchoResponder), &agent_config);

    bus.subscribe_outbound(channel.clone(), |msg| async move {
        println!("{} {}", style("reply:").green().bold(), msg.content);
        for path in &msg.media {
            println!("{} {}", style("attachment:").dim(), path);
        }
        Ok(())
    })
    .await;

    bus.publish_inbound(InboundMessage::new(channel, sender, chat_id, message));
    let inbound = bus.consume_inbound().await;

    match agent.process_inbound_message(inbound).await? {
        Some(reply) => agent.deliver(reply).await,
        None => {
            println!("{}", style("No reply.").dim());
            return Ok(());
        }
    }

    let wait = Duration::from_millis(config.bus.dispatch_interval_ms);
    if !bus.dispatch_next(wait).await {
        anyhow::bail!("Reply was not dispatched within {:?}", wait);
    }
    Ok(())
}

fn run_status(loader: &ConfigLoader, config: &Config) {
    println!("{}", style("Switchboard Status").bold().cyan());
    println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    println!("{}", style("Configuration:").bold());
    println!("  Config directory: {}", loader.config_dir().display());
    let config_state = if loader.config_path().exists() {
        style("found").green()
    } else {
        style("missing, using defaults").yellow()
    };
    println!("  Config file: {}", config_state);
    println!();

    println!("{}", style("Bus:").bold());
    println!("  Dispatch interval: {} ms", config.bus.dispatch_interval_ms);
    println!("  Reply delivery: {:?}", config.agent.delivery);
    println!("  Max message length: {}", config.agent.max_message_length);
    println!();

    println!("{}", style("Channels:").bold());
    let console_status = if config.channels.console.enabled {
        style("enabled").green()
    } else {
        style("disabled").dim()
    };
    println!("  Console: {}", console_status);
    println!();

    println!("{}", style("Logging:").bold());
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);
    println!("  Directory: {}", config.logging.dir);
}
