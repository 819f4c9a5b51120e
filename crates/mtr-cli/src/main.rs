//! CLI for MTR path measurement.

use clap::{Parser, ValueEnum};
use mtr_core::{Config, Mtr, Report};
use mtr_icmp::IcmpTransport;
use std::process::ExitCode;
use std::time::Duration;

/// How hops are probed after discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Probe hops in TTL order; leave unknown hops alone.
    NoRetry,
    /// Probe hops in TTL order; retry unknown hops through the destination.
    Sequential,
    /// One worker per hop.
    Concurrent,
}

/// MTR path measurement: traceroute plus per-hop loss and RTT statistics.
#[derive(Parser, Debug)]
#[command(name = "mtr-probe")]
#[command(version)]
#[command(about = "MTR path measurement: traceroute plus per-hop loss and RTT statistics")]
struct Args {
    /// Destination IPv4 address.
    #[arg(required = true)]
    target: String,

    /// Source IPv4 address to probe from.
    #[arg(short, long, default_value = "0.0.0.0")]
    source: String,

    /// Maximum TTL probed during discovery.
    #[arg(short = 'm', long = "max-hops", default_value = "30")]
    max_hops: u8,

    /// Probes per hop, the discovery probe included.
    #[arg(short, long, default_value = "20")]
    count: u32,

    /// Stop discovery after this many consecutive silent TTLs.
    #[arg(short = 'u', long = "max-unknowns", default_value = "5")]
    max_unknowns: u32,

    /// Per-probe timeout in milliseconds.
    #[arg(long, default_value = "1000")]
    timeout: u64,

    /// Probing mode.
    #[arg(long, value_enum, default_value_t = Mode::Concurrent)]
    mode: Mode,

    /// Emit the report as compact JSON instead of the table form.
    #[arg(long)]
    json: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn to_config(&self) -> Result<Config, String> {
        Config::new(
            &self.source,
            self.max_hops,
            self.count,
            self.max_unknowns,
            Duration::from_millis(self.timeout),
        )
        .map_err(|err| err.to_string())
    }
}

fn emit(report: &Report, json: bool) {
    if json {
        match report.to_json() {
            Ok(doc) => println!("{doc}"),
            Err(err) => eprintln!("Failed to serialize report: {err}"),
        }
    } else {
        print!("{}", report.pretty());
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    } else {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    let config = match args.to_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        target = %args.target,
        source = %config.source_ip,
        count = config.ping_count,
        mode = ?args.mode,
        "starting path measurement"
    );

    let transport = IcmpTransport::new(config.source_ip, config.max_hops, config.base_timeout);
    let mtr = Mtr::new(transport, config);

    let result = match args.mode {
        Mode::NoRetry => mtr.run_path_no_retry(&args.target).await,
        Mode::Sequential => mtr.run_path_sequential(&args.target).await,
        Mode::Concurrent => mtr.run_path_concurrent(&args.target).await,
    };

    let status = match result {
        Ok(report) => {
            emit(&report, args.json);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Measurement failed: {err}");
            // A trace failure still carries the partial report.
            emit(&err.report, args.json);
            ExitCode::FAILURE
        }
    };

    if let Err(err) = mtr.close().await {
        eprintln!("Failed to close transport: {err}");
    }

    status
}
