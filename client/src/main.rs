use clap::Parser;
use client::network::CommandClient;
use log::info;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Echo server address
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", shared::DEFAULT_PORT))]
    server: String,

    /// How long to wait for a reply, in milliseconds
    #[arg(short = 't', long, default_value = "500")]
    timeout_ms: u64,

    /// Command to send; reads commands from stdin, one per line, when omitted
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let client = CommandClient::new(&args.server, Duration::from_millis(args.timeout_ms)).await?;
    info!("Sending commands to {}", client.server_addr());

    if !args.command.is_empty() {
        print_reply(client.send(&args.command.join(" ")).await?);
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        print_reply(client.send(&line).await?);
    }

    Ok(())
}

fn print_reply(reply: Option<String>) {
    match reply {
        Some(reply) => println!("{}", reply),
        None => println!("(no reply)"),
    }
}
