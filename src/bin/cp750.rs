//! CP750 Command Client
//!
//! Command-line interface for a Dolby CP750. Every invocation opens one
//! session, runs a single command and closes the session again.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use cp750::{ClientConfig, Cp750Client, Field, InputMode, Listener};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Command line arguments for the CP750 client
#[derive(Parser)]
#[command(name = "cp750")]
#[command(about = "Query and control a Dolby CP750 cinema processor")]
#[command(version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// CP750 host name or address (overrides the configuration file)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Control port (overrides the configuration file)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Output format: text, json
    #[arg(long, default_value = "text", global = true)]
    format: String,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh and show every field
    Status,
    /// Query a single field by protocol key
    Get { key: String },
    /// Send a value for a field by protocol key
    Set { key: String, value: String },
    /// Show the fader, or set it (0-100)
    Fader {
        #[arg(allow_negative_numbers = true)]
        value: Option<i32>,
    },
    /// Move the fader by a relative amount (-100 to 100)
    Delta {
        #[arg(allow_negative_numbers = true)]
        delta: i32,
    },
    /// Show the mute state, or change it (on/off)
    Mute { state: Option<String> },
    /// Show the input mode, or switch it (analog, dig_1..dig_4, mic, non_sync, last)
    Input { mode: Option<String> },
    /// List recognized fields and their accepted values
    Fields,
    /// Print every value received until the time limit expires
    Watch {
        /// Automatic refresh interval in milliseconds
        #[arg(long, default_value = "5000")]
        interval_ms: u64,
        /// Stop after this many seconds (runs until interrupted when omitted)
        #[arg(long)]
        seconds: Option<u64>,
    },
}

impl Args {
    fn get_config_path(&self) -> Option<String> {
        self.config
            .clone()
            .or_else(|| std::env::var("CP750_CONFIG").ok())
    }

    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match self.get_config_path() {
            Some(path) => ClientConfig::load_from_path(&path)
                .with_context(|| format!("Failed to load configuration from {}", path))?,
            None => ClientConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        Ok(config)
    }

    fn json(&self) -> bool {
        self.format == "json"
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "cp750=debug" } else { "cp750=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Fields = args.command {
        print_fields(&args);
        return Ok(());
    }

    let config = args.client_config()?;
    info!("Using CP750 at {}:{}", config.host, config.port);
    let client = Cp750Client::connect_with_config(&config)
        .with_context(|| format!("Failed to connect to CP750 at {}:{}", config.host, config.port))?;

    let result = run_command(&args, &client);
    client.close();
    result
}

fn run_command(args: &Args, client: &Cp750Client) -> Result<()> {
    match &args.command {
        Commands::Status => {
            client.refresh().context("Status request failed")?;
            print_values(args, &client.current_values());
        }
        Commands::Get { key } => {
            let field: Field = key.parse()?;
            let value = client.query(field)?;
            print_value(args, field, &value);
        }
        Commands::Set { key, value } => {
            let field: Field = key.parse()?;
            if !field.is_allowed_value(value) {
                return Err(anyhow!("Invalid value '{}' for {} (accepted: {})", value, field, field.usage()));
            }
            let reply = client.send(field, value)?;
            print_value(args, field, &reply);
        }
        Commands::Fader { value } => {
            if let Some(value) = value {
                if !Field::SysFader.is_allowed_value(&value.to_string()) {
                    return Err(anyhow!("Fader value must be between 0 and 100"));
                }
                client.set_fader(*value)?;
            }
            let fader = client.get_fader()?;
            print_value(args, Field::SysFader, &fader.to_string());
        }
        Commands::Delta { delta } => {
            if !Field::CtrlFaderDelta.is_allowed_value(&delta.to_string()) {
                return Err(anyhow!("Fader delta must be between -100 and 100"));
            }
            client.set_fader_delta(*delta)?;
            let fader = client
                .current_value(Field::SysFader)
                .ok_or_else(|| anyhow!("Fader value unknown"))?;
            print_value(args, Field::SysFader, &fader);
        }
        Commands::Mute { state } => {
            if let Some(state) = state {
                let muted = match state.to_ascii_lowercase().as_str() {
                    "on" | "1" | "true" => true,
                    "off" | "0" | "false" => false,
                    other => return Err(anyhow!("Invalid mute state '{}', use on or off", other)),
                };
                client.set_muted(muted)?;
            }
            let muted = client.is_muted()?;
            print_value(args, Field::SysMute, if muted { "1" } else { "0" });
        }
        Commands::Input { mode } => {
            if let Some(mode) = mode {
                let mode: InputMode = mode.parse().map_err(|e: String| anyhow!(e))?;
                client.set_input_mode(mode)?;
            }
            let mode = client.get_input_mode()?;
            print_value(args, Field::SysInputMode, mode.as_str());
        }
        Commands::Watch { interval_ms, seconds } => {
            watch(args, client, Duration::from_millis(*interval_ms), seconds.map(Duration::from_secs))?;
        }
        Commands::Fields => print_fields(args),
    }
    Ok(())
}

fn watch(args: &Args, client: &Cp750Client, interval: Duration, limit: Option<Duration>) -> Result<()> {
    let json = args.json();
    let listener: Listener = Arc::new(move |field: Field, value: &str| {
        if json {
            println!("{}", serde_json::json!({ "field": field.key(), "value": value }));
        } else {
            println!("{} {}", field.key(), value);
        }
    });
    for field in Field::queryable() {
        client.add_listener(field, &listener);
    }

    client.set_refresh_interval(interval);
    client.refresh().context("Initial status request failed")?;

    let started = Instant::now();
    while limit.map_or(true, |limit| started.elapsed() < limit) {
        if client.is_closed() {
            return Err(anyhow!("Connection to {} closed", client.peer_addr()));
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    client.remove_listener(&listener);
    Ok(())
}

fn print_value(args: &Args, field: Field, value: &str) {
    if args.json() {
        let mut map = serde_json::Map::new();
        map.insert(field.key().to_string(), serde_json::Value::from(value));
        println!("{}", serde_json::Value::Object(map));
    } else if value.is_empty() {
        eprintln!("✗ No response for {}", field);
    } else {
        println!("< {}", value);
    }
}

fn print_values(args: &Args, values: &[(Field, String)]) {
    if args.json() {
        let map: serde_json::Map<String, serde_json::Value> = values
            .iter()
            .map(|(field, value)| (field.key().to_string(), serde_json::Value::from(value.as_str())))
            .collect();
        println!("{}", serde_json::Value::Object(map));
    } else {
        for (field, value) in values {
            println!("{:<24} {}", field.key(), value);
        }
    }
}

fn print_fields(args: &Args) {
    if args.json() {
        let fields: Vec<_> = Field::ALL
            .iter()
            .map(|field| serde_json::json!({ "key": field.key(), "values": field.usage() }))
            .collect();
        println!("{}", serde_json::Value::Array(fields));
        return;
    }
    println!("Available fields:");
    for field in Field::ALL {
        println!("    {} {}", field.key(), field.usage());
    }
}
