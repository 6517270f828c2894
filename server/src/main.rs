use clap::Parser;
use log::info;
use server::network::Server;
use shared::TICK_INTERVAL;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port workers connect to
    #[arg(short, long, default_value = "9000")]
    port: u16,

    /// Interval between timer updates in milliseconds
    #[arg(
        short,
        long,
        default_value_t = TICK_INTERVAL.as_millis() as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    info!("Starting game state authority...");
    let server = Server::new(&address, Duration::from_millis(args.tick_ms)).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down game state authority...");
        }
    }

    Ok(())
}
