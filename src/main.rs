//! fast-comm command line client
//!
//! Publishes, listens and runs the publish/read-back round trip against a
//! broker using the synchronous communicator API.

use clap::{Parser, Subcommand};
use fast_comm::communicator::{Communicator, MqttCommunicator};
use fast_comm::config::CommConfig;
use fast_comm::error::{CommError, CommResult};
use fast_comm::observability::init_default_logging;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// How often `listen` checks for Ctrl-C while waiting for messages
const LISTEN_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Synchronous MQTT publish/subscribe client
#[derive(Parser)]
#[command(name = "fast-comm")]
#[command(about = "Synchronous MQTT publish/subscribe client")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Broker host (overrides the config file)
    #[arg(long, env = "FAST_COMM_HOST")]
    host: Option<String>,

    /// Broker port (overrides the config file)
    #[arg(long, env = "FAST_COMM_PORT")]
    port: Option<u16>,

    /// Client id; empty lets the client pick one
    #[arg(long)]
    id: Option<String>,

    /// Give up connecting after this many milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish one message
    Publish {
        #[arg(short, long)]
        message: String,
        /// Topic to publish to (defaults to the configured publish topic)
        #[arg(short, long)]
        topic: Option<String>,
    },
    /// Print messages arriving on a filter until Ctrl-C
    Listen {
        /// Filter to subscribe (defaults to the configured subscribe topic)
        #[arg(short, long)]
        filter: Option<String>,
        /// Stop after this many messages
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
    /// Publish to the default topic and read the message back
    Roundtrip {
        #[arg(short, long, default_value = "Hallo Welt")]
        message: String,
    },
    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    init_default_logging();

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Publish { message, topic } => publish(config, &message, topic.as_deref()),
        Commands::Listen { filter, count } => listen(config, filter.as_deref(), count),
        Commands::Roundtrip { message } => roundtrip(config, &message),
        Commands::Config => show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(cli: &Cli) -> CommResult<CommConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            CommConfig::load_from_file(path)?
        }
        None => match find_default_config() {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                CommConfig::load_from_file(&path)?
            }
            None => CommConfig::new("", "topic1", "topic1", "localhost", 1883, 60),
        },
    };

    if let Some(host) = &cli.host {
        config.broker.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.broker.port = port;
    }
    if let Some(id) = &cli.id {
        config.communicator.id = id.clone();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_connect_timeout(Duration::from_millis(timeout_ms));
    }

    config.validate()?;
    Ok(config)
}

fn find_default_config() -> Option<PathBuf> {
    ["fast-comm.toml", "config/fast-comm.toml"]
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .map(Path::to_path_buf)
}

fn publish(config: CommConfig, message: &str, topic: Option<&str>) -> CommResult<()> {
    let communicator = MqttCommunicator::new(config)?;
    match topic {
        Some(topic) => communicator.send_message_to(message, topic)?,
        None => communicator.send_message(message)?,
    }
    info!("Message published");
    Ok(())
}

fn listen(config: CommConfig, filter: Option<&str>, count: Option<usize>) -> CommResult<()> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, stop.clone())
            .map_err(|e| CommError::connection_failure(format!("signal handler: {e}")))?;
    }

    let communicator = MqttCommunicator::new(config)?;
    let filter = match filter {
        Some(filter) if filter != communicator.config().communicator.subscribe_topic => {
            communicator.add_subscription(filter)?;
            filter.to_string()
        }
        _ => communicator.config().communicator.subscribe_topic.clone(),
    };

    info!(filter = %filter, "Listening, press Ctrl-C to stop");
    let mut received = 0usize;
    while !stop.load(Ordering::Relaxed) && count.map_or(true, |n| received < n) {
        match communicator.receive_from(&filter, Some(LISTEN_POLL_INTERVAL)) {
            Ok(message) => {
                received += 1;
                println!("{}\t{}", message.topic, message.payload_str());
            }
            Err(CommError::ReceiveTimeout { .. }) => continue,
            Err(e) => return Err(e),
        }
    }

    info!(received, "Listener stopped");
    Ok(())
}

/// Works with any communicator: send one message, block until one arrives
fn roundtrip_with<C: Communicator>(communicator: &C, message: &str) -> CommResult<String> {
    communicator.send_message(message)?;
    communicator.get_message()
}

fn roundtrip(config: CommConfig, message: &str) -> CommResult<()> {
    let communicator = MqttCommunicator::new(config)?;
    let echoed = roundtrip_with(&communicator, message)?;
    println!("{echoed}");
    Ok(())
}

fn show_config(config: &CommConfig) -> CommResult<()> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| CommError::Config(fast_comm::config::ConfigError::InvalidConfig(e.to_string())))?;
    println!("{rendered}");
    Ok(())
}
