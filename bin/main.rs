#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

//! Command-line front end for the mail server probes.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mxprobe::{AddressFamily, Config, MailProbe, RecordType, DEFAULT_SERVICE_PORT};
use serde::Serialize;

/// Mail server reachability and identity diagnostics
#[derive(Parser, Debug)]
#[command(name = "mxprobe")]
#[command(about = "Probe mail servers", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overall deadline for the command, in milliseconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// SMTP host used by `helo`
    #[arg(long)]
    smtp_host: Option<String>,

    /// SMTP port used by `helo`
    #[arg(long)]
    smtp_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Measure the round-trip time to a host
    Ping { host: String },
    /// Resolve a host name through the operating system
    Lookup {
        hostname: String,
        /// Address family: 4, 6 or any
        #[arg(short, long, default_value = "any")]
        family: AddressFamily,
        /// Return every address instead of the first
        #[arg(short, long)]
        all: bool,
    },
    /// Find the host and service names for an address and port
    LookupService {
        address: String,
        #[arg(default_value_t = DEFAULT_SERVICE_PORT)]
        port: u16,
    },
    /// Query DNS records
    Resolve {
        hostname: String,
        #[arg(default_value = "A")]
        record_type: RecordType,
        /// Name servers to query instead of the system ones
        #[arg(short, long, value_delimiter = ',')]
        servers: Vec<String>,
    },
    /// Find the host names for an address
    Reverse { address: String },
    /// Print the name servers in use
    Servers,
    /// Announce a host name to the SMTP endpoint
    Helo { remote_host: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mxprobe::logging::init();

    let cli = Cli::parse();
    let probe = MailProbe::new(load_config(&cli)?)?;

    tokio::select! {
        result = run(&probe, cli.command) => result,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("Interrupted"),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("MXPROBE_CONFIG").map(PathBuf::from));

    let mut config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(timeout) = cli.timeout {
        config.timeout_ms = timeout;
    }
    if let Some(host) = &cli.smtp_host {
        config.smtp.host.clone_from(host);
    }
    if let Some(port) = cli.smtp_port {
        config.smtp.port = port;
    }

    config.validate()?;
    Ok(config)
}

async fn run(probe: &MailProbe, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ping { host } => print(&probe.ping(&host).await?),
        Commands::Lookup {
            hostname,
            family,
            all: true,
        } => print(&probe.lookup_all(&hostname, family).await?),
        Commands::Lookup {
            hostname, family, ..
        } => print(&probe.lookup(&hostname, family).await?),
        Commands::LookupService { address, port } => {
            print(&probe.lookup_service(&address, port).await?)
        }
        Commands::Resolve {
            hostname,
            record_type,
            servers,
        } => {
            if !servers.is_empty() {
                probe.set_servers(&servers)?;
            }
            print(&probe.resolve(&hostname, record_type).await?)
        }
        Commands::Reverse { address } => print(&probe.reverse(&address).await?),
        Commands::Servers => print(&probe.get_servers()),
        Commands::Helo { remote_host } => print(&probe.helo(&remote_host).await?),
    }
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
