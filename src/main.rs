//! Command-line access to reactive configuration files.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

use reactive_config::observability::logging::init_logging;
use reactive_config::{ConfigError, ConfigEvent, ConfigHandle, ConfigOptions};

#[derive(Parser)]
#[command(name = "reactive-config")]
#[command(about = "Inspect, edit and watch JSON/TOML configuration files", long_about = None)]
struct Cli {
    /// Create the file when it does not exist
    #[arg(long, global = true)]
    create: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a field (or the whole document) as JSON
    Get {
        file: PathBuf,
        #[arg(default_value = "")]
        path: String,
        /// Summarise objects nested deeper than this as key lists
        #[arg(short, long)]
        depth: Option<usize>,
    },
    /// Set a field and write the file
    Set {
        file: PathBuf,
        path: String,
        /// JSON value; anything that is not valid JSON is stored as a string
        value: String,
    },
    /// Check the file against its schema
    Validate { file: PathBuf },
    /// Print a field every time the file changes, until Ctrl-C
    Watch {
        file: PathBuf,
        #[arg(default_value = "")]
        path: String,
        #[arg(long, default_value_t = 500)]
        delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("reactive_config=warn");
    let cli = Cli::parse();
    let options = ConfigOptions {
        create_on_no_entry: cli.create,
        ..Default::default()
    };

    match cli.command {
        Commands::Get { file, path, depth } => {
            let config = ConfigHandle::new(file, options)?;
            config.read(None).await?;
            let value = config.get(path.as_str(), depth)?.unwrap_or(Value::Null);
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Set { file, path, value } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let config = ConfigHandle::new(file, options)?;
            config.read(None).await?;
            config.set(path.as_str(), value)?;
            config.write_now().await?;
        }
        Commands::Validate { file } => {
            let config = ConfigHandle::new(file, options)?;
            match config.read(None).await {
                Ok(()) => println!("{}: valid", config.config_file().display()),
                Err(ConfigError::Validation(errors)) => {
                    eprintln!("{}: {} error(s)", config.config_file().display(), errors.len());
                    eprint!("{errors}");
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Watch { file, path, delay_ms } => {
            let options = ConfigOptions {
                auto_reload: true,
                reload_delay_ms: delay_ms,
                ..options
            };
            let config = ConfigHandle::new(file, options)?;
            let mut events = config.events();
            config.read(None).await?;
            let mut field = config.subscribe(path.as_str(), None)?;

            loop {
                tokio::select! {
                    emission = field.recv() => match emission {
                        Some(value) => println!("{}", serde_json::to_string(&value.unwrap_or(Value::Null))?),
                        None => break,
                    },
                    event = events.recv() => {
                        if let Ok(ConfigEvent::Error(e)) = event {
                            eprintln!("reload failed: {e}");
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            config.close().await?;
        }
    }

    Ok(())
}
