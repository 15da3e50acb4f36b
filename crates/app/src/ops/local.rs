use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Subcommand};

use service::client::{Client, ClientConfig, ClientError, SecureBootKeys};

use crate::hexify;

#[derive(Subcommand)]
pub enum Local {
    /// Drive a provisioning session against a waiting device
    Run(RunArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// One-time password shared with the device
    #[arg(short = 'o', long)]
    otp: String,

    /// Address the device listens on
    #[arg(short = 'i', long)]
    ip: IpAddr,

    /// Port the device listens on
    #[arg(short = 'p', long, default_value_t = 2009)]
    port: u16,

    /// Secure Boot PK file (authentication_v2 descriptor)
    #[arg(long)]
    pk: Option<PathBuf>,

    /// Secure Boot KEK file (authentication_v2 descriptor)
    #[arg(long)]
    kek: Option<PathBuf>,

    /// Secure Boot db file (authentication_v2 descriptor)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Secure Boot dbx file (authentication_v2 descriptor)
    #[arg(long)]
    dbx: Option<PathBuf>,

    /// Do not ask the firmware to reboot into its menu after provisioning
    #[arg(long)]
    no_uefi_menu_reboot: bool,

    /// Connection attempts made while the device is still starting up
    #[arg(long, default_value_t = 10)]
    connect_attempts: u32,
}

impl Local {
    pub async fn execute(self) -> anyhow::Result<()> {
        match self {
            Local::Run(args) => run(args).await,
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let secure_boot = load_secure_boot_keys(&args)?;
    let have_keys = secure_boot.is_some();

    let client = Client::new(ClientConfig {
        secret: args.otp.clone(),
        remote_ip: args.ip,
        remote_port: args.port,
        secure_boot,
    })?;

    // The protocol client never retries on its own; waiting out device
    // start-up is this caller's job.
    let mut attempt = 0;
    let data = loop {
        match client.contribute_entropy().await {
            Ok(data) => break data,
            Err(ClientError::Request(e)) if attempt < args.connect_attempts && e.is_connect() => {
                attempt += 1;
                tracing::debug!("device not reachable yet (attempt {attempt}): {e}");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(e) => return Err(e.into()),
        }
    };

    if have_keys {
        client.submit_secure_boot_keys().await?;
    }
    let response = client.commit().await?;

    tracing::info!(
        "added entropy\n\n{}",
        hexify::format(data.entropy.bytes())
    );
    println!("fingerprint={}", response.fingerprint);
    println!("hostname={}", response.hostname);
    println!("ip={}", args.ip);
    Ok(())
}

fn load_secure_boot_keys(args: &RunArgs) -> anyhow::Result<Option<SecureBootKeys>> {
    let read = |path: &Option<PathBuf>| -> anyhow::Result<Option<Vec<u8>>> {
        path.as_ref()
            .map(|path| {
                std::fs::read(path).with_context(|| format!("read {}", path.display()))
            })
            .transpose()
    };

    let pk = read(&args.pk)?;
    let kek = read(&args.kek)?;
    let db = read(&args.db)?;
    let dbx = read(&args.dbx)?;
    if pk.is_none() && kek.is_none() && db.is_none() && dbx.is_none() {
        return Ok(None);
    }

    let (Some(pk), Some(kek), Some(db)) = (pk, kek, db) else {
        anyhow::bail!("invalid Secure Boot options: PK, KEK, and db are required");
    };
    Ok(Some(SecureBootKeys {
        pk,
        kek,
        db,
        dbx,
        reboot_into_uefi_menu: !args.no_uefi_menu_reboot,
    }))
}
