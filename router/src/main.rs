use clap::{ArgAction, Parser};
use log::info;
use router::affinity::Backend;
use router::proxy::{Router, RouterConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address clients connect to
    #[arg(short, long, default_value = "0.0.0.0:8000")]
    listen: String,

    /// Worker address as host:port; repeat for each worker
    #[arg(
        short,
        long = "backend",
        default_values = ["127.0.0.1:8001", "127.0.0.1:8002"]
    )]
    backends: Vec<Backend>,

    /// Seconds to wait for a worker to accept
    #[arg(short, long, default_value = "10")]
    connect_timeout_secs: u64,

    /// Unpin a client when its worker refuses the connection
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    evict_on_refusal: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = RouterConfig {
        listen: args.listen,
        backends: args.backends,
        connect_timeout: Duration::from_secs(args.connect_timeout_secs),
        evict_on_refusal: args.evict_on_refusal,
    };

    info!("Starting sticky router...");
    let router = Router::bind(config).await?;

    tokio::select! {
        result = router.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down sticky router...");
        }
    }

    Ok(())
}
