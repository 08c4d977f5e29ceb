//! PlugKV CLI Client
//!
//! Command-line interface for interacting with PlugKV.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use plugkv::network::{Client, ClientError};
use plugkv::Value;

/// PlugKV CLI
#[derive(Parser, Debug)]
#[command(name = "plugkv-cli")]
#[command(about = "CLI for the PlugKV key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:50052")]
    server: String,

    /// Reply timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    /// Largest reply payload accepted (bytes)
    #[arg(long, default_value_t = plugkv::protocol::MAX_PAYLOAD_SIZE)]
    max_response_bytes: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value, as JSON (anything that isn't JSON is stored as a string)
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Ping the server
    Ping,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), ClientError> {
    let mut client = Client::connect(&args.server)?;
    client.set_timeout(Some(Duration::from_millis(args.timeout_ms)))?;
    client.set_max_response_bytes(args.max_response_bytes);

    match args.command {
        Commands::Get { key } => {
            let value = client.get(&key)?;
            println!("{}", value);
        }
        Commands::Set { key, value } => {
            client.set(&key, &parse_value(&value))?;
            println!("OK");
        }
        Commands::Del { key } => {
            client.delete(&key)?;
            println!("OK");
        }
        Commands::Ping => {
            println!("{}", client.ping()?);
        }
    }

    Ok(())
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}
