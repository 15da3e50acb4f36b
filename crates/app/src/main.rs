mod hexify;
mod ops;
mod store;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "stprov", about = "Provision a platform over OTP-bootstrapped HTTPS")]
struct Cli {
    /// Log level filter, e.g. "info" or "debug"
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Device-side commands, run on the platform being provisioned
    #[command(subcommand)]
    Remote(ops::remote::Remote),
    /// Operator-side commands, run from the trusted network
    #[command(subcommand)]
    Local(ops::local::Local),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let env_filter =
        EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_filter(env_filter);
    tracing_subscriber::registry().with(fmt_layer).init();
    service::process::register_panic_logger();

    let result = match cli.command {
        Command::Remote(cmd) => cmd.execute().await,
        Command::Local(cmd) => cmd.execute().await,
    };
    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
