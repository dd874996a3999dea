use clap::Parser;
use httpbench_client::RawHttpFetcher;
use httpbench_runner::aggregator::summarize;
use httpbench_runner::config::{BenchConfig, OutputFormat};
use httpbench_runner::dispatcher::Dispatcher;
use httpbench_runner::report::{render_json, render_table};
use std::process;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "httpbench", about = "Latency benchmark for a single HTTP(S) endpoint")]
struct Args {
    /// Endpoint to profile, e.g. https://example.com/health
    #[arg(long)]
    url: String,

    /// Number of requests to issue
    #[arg(long, default_value_t = 1)]
    profile: usize,

    /// Requests per batch; missing or non-positive uses the number of CPUs
    #[arg(long, allow_negative_numbers = true)]
    concurrency: Option<i64>,

    /// Connection setup timeout (milliseconds)
    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// Stop reading a response after this many milliseconds
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Pause between batches (milliseconds)
    #[arg(long, default_value_t = 0)]
    pause_ms: u64,

    /// Print the report as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    fn to_config(&self) -> httpbench_common::Result<BenchConfig> {
        let mut config = BenchConfig::new(&self.url, self.profile, self.concurrency)?;
        config.connect_timeout = Duration::from_millis(self.connect_timeout_ms);
        config.read_window = self.read_timeout_ms.map(Duration::from_millis);
        config.pause = Duration::from_millis(self.pause_ms);
        config.format = if self.json { OutputFormat::Json } else { OutputFormat::Table };
        Ok(config)
    }
}

fn init_logging(args: &Args) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args);

    let config = args.to_config().unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {e}");
        process::exit(3);
    });

    let fetcher = RawHttpFetcher::new(config.fetch_config()).unwrap_or_else(|e| {
        eprintln!("Failed to initialise TLS: {e}");
        process::exit(3);
    });

    info!(
        endpoint = %config.target.authority(),
        path = %config.target.path,
        requests = config.requests,
        concurrency = config.concurrency,
        "starting benchmark"
    );

    let dispatcher = Dispatcher::new(fetcher, config.concurrency).with_pause(config.pause);
    let mut outcomes = dispatcher.run(&config.target, config.requests).await;
    debug!(?outcomes, "raw outcomes");

    let report = summarize(&mut outcomes);

    match config.format {
        OutputFormat::Table => print!("{}", render_table(&report)),
        OutputFormat::Json => match render_json(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to encode report: {e}");
                process::exit(1);
            }
        },
    }
}
