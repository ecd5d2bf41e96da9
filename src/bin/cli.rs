//! splitkv CLI Client
//!
//! Command-line interface for interacting with a splitkv server.

use std::io::BufReader;
use std::net::TcpStream;

use clap::{Parser, Subcommand};
use splitkv::protocol::{read_reply, write_request, Response};

/// splitkv CLI
#[derive(Parser, Debug)]
#[command(name = "splitkv-cli")]
#[command(about = "CLI for the splitkv key-value server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:16379")]
    server: String,

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

        /// The value to set
        value: String,
    },

    /// Ping the server
    Ping {
        /// Optional message to echo back
        message: Option<String>,
    },
}

fn main() {
    let args = Args::parse();

    let request: Vec<&str> = match &args.command {
        Commands::Get { key } => vec!["GET", key.as_str()],
        Commands::Set { key, value } => vec!["SET", key.as_str(), value.as_str()],
        Commands::Ping { message: Some(m) } => vec!["PING", m.as_str()],
        Commands::Ping { message: None } => vec!["PING"],
    };

    match run(&args.server, &request) {
        Ok(Response::Error(message)) => {
            eprintln!("(error) {}", message);
            std::process::exit(1);
        }
        Ok(reply) => print_reply(&reply),
        Err(e) => {
            eprintln!("Could not talk to {}: {}", args.server, e);
            std::process::exit(1);
        }
    }
}

fn run(addr: &str, request: &[&str]) -> splitkv::Result<Response> {
    let mut stream = TcpStream::connect(addr)?;
    write_request(&mut stream, request)?;
    let mut reader = BufReader::new(stream);
    read_reply(&mut reader)
}

fn print_reply(reply: &Response) {
    match reply {
        Response::Simple(text) => println!("{}", String::from_utf8_lossy(text)),
        Response::Bulk(bytes) => println!("\"{}\"", String::from_utf8_lossy(bytes)),
        Response::Null => println!("(nil)"),
        Response::Error(message) => println!("(error) {}", message),
    }
}
