//! TenantKV CLI Client
//!
//! Command-line interface for interacting with a TenantKV server.

use clap::{Parser, Subcommand};
use tenantkv::network::Client;
use tenantkv::protocol::StreamGetResponse;
use tenantkv::{Query, Result};

/// TenantKV CLI
#[derive(Parser, Debug)]
#[command(name = "tenantkv-cli")]
#[command(about = "CLI for the TenantKV key-value service")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:50051")]
    server: String,

    /// Logical database to operate on
    #[arg(short, long, default_value = "default")]
    db: String,

    /// Per-call deadline in milliseconds (0 = none)
    #[arg(short, long, default_value = "0")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get { key: String },

    /// Set a key-value pair
    Put { key: String, value: String },

    /// Delete a key
    Del { key: String },

    /// List every key with the given prefix
    Scan {
        /// Empty lists the whole database
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Fetch several keys at once
    Mget {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Ping the server
    Ping,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut client = Client::connect(&args.server)?.with_timeout(args.timeout_ms);

    match args.command {
        Commands::Ping => {
            client.ping()?;
            println!("PONG");
        }
        Commands::Put { key, value } => {
            let resp = client.put(&args.db, key.as_bytes(), value.as_bytes())?;
            if resp.success {
                println!("OK");
            } else {
                println!("(error) {}", resp.error);
            }
        }
        Commands::Get { key } => {
            let resp = client.get(&args.db, key.as_bytes())?;
            if resp.found {
                println!("{}", String::from_utf8_lossy(&resp.value));
            } else if !resp.error.is_empty() {
                println!("(error) {}", resp.error);
            } else {
                println!("(nil)");
            }
        }
        Commands::Del { key } => {
            let resp = client.delete(&args.db, key.as_bytes())?;
            if resp.success {
                println!("OK");
            } else {
                println!("(error) {}", resp.error);
            }
        }
        Commands::Scan { prefix } => {
            let query = Query::Prefix(prefix.into_bytes());
            for item in client.stream_get(&args.db, query)? {
                print_item(&item?);
            }
        }
        Commands::Mget { keys } => {
            let keys = keys.into_iter().map(String::into_bytes).collect();
            for item in client.stream_get(&args.db, Query::Keys(keys))? {
                print_item(&item?);
            }
        }
    }

    Ok(())
}

fn print_item(item: &StreamGetResponse) {
    let key = String::from_utf8_lossy(&item.key);
    if item.error.is_empty() {
        println!("{} = {}", key, String::from_utf8_lossy(&item.value));
    } else {
        println!("{} (error) {}", key, item.error);
    }
}
