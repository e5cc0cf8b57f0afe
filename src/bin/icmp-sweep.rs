use async_icmp_sweep::{
    local, AddressRange, Client, ClientConfigBuilder, Error, ScanConfigBuilder, Scanner,
};
use clap::Parser;
use log::info;
use std::{io::Write, process::ExitCode, sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

/// Discover live hosts on the local /24 subnet with ICMP echo requests
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Network interface whose IPv4 subnet is swept (first usable one if omitted)
    #[arg(short, long)]
    iface: Option<String>,

    /// Sweep this CIDR instead of the interface subnet
    #[arg(short, long, conflicts_with = "iface")]
    cidr: Option<String>,

    /// Extra rounds after the first sweep
    #[arg(short, long, default_value_t = 25)]
    retries: usize,

    /// Per-probe reply timeout in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Maximum number of probes in flight
    #[arg(long, default_value_t = 256)]
    concurrency: usize,

    /// Pause between rounds in milliseconds
    #[arg(long, default_value_t = 100)]
    round_delay_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> async_icmp_sweep::Result<()> {
    let cidr = match (args.cidr, args.iface) {
        (Some(cidr), _) => cidr,
        (None, Some(iface)) => local::subnet_cidr(local::interface_ipv4(&iface)?),
        (None, None) => {
            let (iface, ip) = local::default_interface_ipv4()?;
            info!("using interface {} ({})", iface, ip);
            local::subnet_cidr(ip)
        }
    };

    let config = ScanConfigBuilder::new()
        .with_retries(args.retries)
        .with_response_timeout(Duration::from_millis(args.timeout_ms))
        .with_concurrency(args.concurrency)
        .with_round_delay(Duration::from_millis(args.round_delay_ms))
        .build()
        .map_err(|err| Error::Opaque(err.into()))?;

    let range = AddressRange::parse(&cidr)?;
    let client = Client::new(ClientConfigBuilder::new().build())?;
    let scanner = Scanner::new(Arc::new(client), config);
    info!("sweeping {} ({} hosts)", cidr, range.len());
    let report = scanner.scan(&range).await;
    info!(
        "{} probes over {} rounds, failures: {:?}",
        report.probes_issued, report.rounds, report.failures
    );

    let mut stdout = std::io::stdout().lock();
    for host in report.hosts() {
        writeln!(stdout, "{}", host).map_err(|err| Error::Opaque(err.into()))?;
    }
    Ok(())
}
