use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};

use service::config::{
    parse_allow_list, ServerConfig, DEFAULT_REQUEST_DEADLINE, DEFAULT_SHUTDOWN_TIMEOUT,
};
use service::process::{graceful_shutdown_blocker, Server};
use service::storage::HostKeyStore;

use crate::hexify;
use crate::store::{FsHostKeyStore, FsSecureBootStore};

#[derive(Subcommand)]
pub enum Remote {
    /// Serve one provisioning session and persist the derived host key
    Run(RunArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// One-time password shared with the operator
    #[arg(short = 'o', long)]
    otp: String,

    /// Listening address
    #[arg(short = 'i', long, default_value = "0.0.0.0")]
    ip: IpAddr,

    /// Listening port
    #[arg(short = 'p', long, default_value_t = 2009)]
    port: u16,

    /// Address the operator may connect from, in CIDR format; can be
    /// repeated.  A bare address means exactly that host.
    #[arg(short = 'a', long = "allow", default_value = "127.0.0.1/32")]
    allow: Vec<String>,

    /// Host name handed back to the operator
    #[arg(long, default_value = "localhost.local")]
    hostname: String,

    /// Directory the firmware stand-in stores persist to
    #[arg(long, default_value = "stprov-state")]
    state_dir: PathBuf,
}

impl Remote {
    pub async fn execute(self) -> anyhow::Result<()> {
        match self {
            Remote::Run(args) => run(args).await,
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let allowed_nets = parse_allow_list(&args.allow)?;
    let secure_boot = Arc::new(FsSecureBootStore::new(args.state_dir.clone()));

    let server = Server::new(
        ServerConfig {
            secret: args.otp,
            listen_addr: SocketAddr::new(args.ip, args.port),
            allowed_nets,
            hostname: args.hostname,
            request_deadline: DEFAULT_REQUEST_DEADLINE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        },
        secure_boot,
    )?;
    let session = server.session();

    let (_signal_task, _shutdown_tx, shutdown_rx) = graceful_shutdown_blocker();
    server.run(shutdown_rx).await?;

    let Some(uds) = session.uds() else {
        anyhow::bail!("session ended without a commit");
    };
    tracing::info!(
        "received entropy\n\n{}",
        hexify::format(session.entropy().bytes())
    );

    let host_key = uds.ssh_host_key()?;
    let key_store = FsHostKeyStore::new(args.state_dir.join("hostkey.pem"));
    key_store.store(host_key.to_pem().as_bytes())?;
    tracing::info!(fingerprint = %host_key.fingerprint(), "host key persisted");
    Ok(())
}
