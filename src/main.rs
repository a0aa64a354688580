use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colored::Colorize;
use log::{debug, info, warn};
use netspeed::client::HttpTransport;
use netspeed::config::{SpeedTestConfig, DEFAULT_PING_COUNT};
use netspeed::errors::{exit_codes, format_error_for_display, SpeedTestError};
use netspeed::geo;
use netspeed::output::{self, ConsoleProgress, DisplayMode};
use netspeed::results::SpeedTestResults;
use netspeed::server::{self, ServerConfig, DEFAULT_SIZE, MAX_SIZE};
use netspeed::speedtest::TestEngine;
use std::io::IsTerminal;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use url::Url;

#[derive(Parser)]
#[command(author, version = env!("NETSPEED_VERSION"), about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Used when no subcommand is given
    #[command(flatten)]
    run: RunArgs,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

impl Cli {
    /// The subcommand to execute; a bare invocation means `run`.
    fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Run(self.run))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Measure latency, download and upload speed (the default)
    Run(RunArgs),
    /// Serve random bytes for other clients to measure against
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Origin of a netspeed server; without one, public hosts are used
    #[arg(short, long, env = "NETSPEED_SERVER")]
    server: Option<Url>,

    /// Number of latency samples
    #[arg(
        long,
        default_value_t = DEFAULT_PING_COUNT,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pings: usize,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Skip the public IP and location lookup
    #[arg(long)]
    skip_geo: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Bytes sent when a download request has no `size`
    #[arg(long, default_value_t = DEFAULT_SIZE)]
    default_size: u64,

    /// Largest download a single request may ask for
    #[arg(long, default_value_t = MAX_SIZE)]
    max_size: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .parse_default_env()
        .init();

    let result = match cli.into_command() {
        Command::Serve(args) => serve(args).await,
        Command::Run(args) => run(args).await,
    };

    if let Err(e) = result {
        eprintln!("{}", format_error_for_display(&e));
        std::process::exit(e.exit_code());
    }

    std::process::exit(exit_codes::SUCCESS);
}

async fn run(args: RunArgs) -> Result<(), SpeedTestError> {
    let mode = DisplayMode::detect(args.json, std::io::stdout().is_terminal());
    let config =
        SpeedTestConfig::resolve(args.server.as_ref())?.with_ping_count(args.pings);
    let transport = HttpTransport::new()?;

    debug!("Display mode: {:?}", mode);

    let connection = if args.skip_geo {
        None
    } else {
        geo::try_lookup(&transport, &config.external.geolocation).await
    };

    if mode != DisplayMode::Json {
        println!(
            "{} {}",
            "Test mode:".bold().white(),
            config.deployment.label().bright_blue()
        );
        output::print_connection(connection.as_ref());
        println!();
    }

    let mut engine = TestEngine::new(config, &transport);
    if mode == DisplayMode::Progress {
        engine = engine.with_progress(Arc::new(ConsoleProgress));
    }

    let outcome = engine.run().await;
    let results =
        SpeedTestResults::from_engine_output(&outcome, engine.config(), connection);

    match mode {
        DisplayMode::Json => {
            let json = serde_json::to_string_pretty(&results).map_err(|e| {
                SpeedTestError::unknown("Failed to serialize results").with_source(e)
            })?;
            println!("{}", json);
        }
        DisplayMode::Progress => {
            eprintln!();
            output::print_summary(&results);
        }
        DisplayMode::Plain => output::print_summary(&results),
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<(), SpeedTestError> {
    if args.default_size > args.max_size {
        return Err(SpeedTestError::config(format!(
            "--default-size ({}) is larger than --max-size ({})",
            args.default_size, args.max_size
        )));
    }

    let config = ServerConfig {
        default_size: args.default_size,
        max_size: args.max_size,
        ..ServerConfig::default()
    };
    let listener = server::bind(SocketAddr::new(args.host, args.port)).await?;

    server::serve(listener, config, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C"),
            Err(e) => {
                warn!("Cannot listen for Ctrl-C, serving until killed: {}", e);
                std::future::pending::<()>().await
            }
        }
    })
    .await
}
