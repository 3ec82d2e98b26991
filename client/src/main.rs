use clap::Parser;
use client::console::console_input_thread;
use client::network::Client;
use log::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", shared::DEFAULT_PORT))]
    server: String,

    /// Connect at startup instead of starting in local simulation
    #[arg(long)]
    online: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting client...");
    info!("Server address: {}", args.server);

    let mut client = Client::new(&args.server);

    if args.online {
        if let Err(e) = client.go_online().await {
            error!("Failed to connect, staying offline: {}", e);
        }
    }

    client.run(console_input_thread()).await?;

    Ok(())
}
