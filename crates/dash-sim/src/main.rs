use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use dash_sim::{run_grid, run_pipeline, SimulatorConfig, SimulatorReport};
use dash_sync::CoordinatorConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn workload_args(command: Command, operations: &'static str) -> Command {
    command
        .arg(
            Arg::new("records")
                .long("records")
                .default_value("20")
                .value_parser(value_parser!(u64))
                .help("Number of records in view"),
        )
        .arg(
            Arg::new(operations)
                .long(operations)
                .default_value("100")
                .value_parser(value_parser!(u64))
                .help("Number of user operations to simulate"),
        )
        .arg(
            Arg::new("failure-rate")
                .long("failure-rate")
                .default_value("0.1")
                .value_parser(value_parser!(f64))
                .help("Probability that a backend write fails"),
        )
        .arg(
            Arg::new("latency-ms")
                .long("latency-ms")
                .default_value("15")
                .value_parser(value_parser!(u64))
                .help("Base backend latency in milliseconds"),
        )
        .arg(
            Arg::new("debounce-ms")
                .long("debounce-ms")
                .value_parser(value_parser!(u64))
                .help("Override the coordinator quiet period"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("Coordinator settings file (TOML)"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .default_value("42")
                .value_parser(value_parser!(u64))
                .help("Random seed for reproducibility"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Output as JSON"),
        )
}

fn arg<T: Clone + Send + Sync + 'static>(args: &ArgMatches, name: &str) -> anyhow::Result<T> {
    args.get_one::<T>(name)
        .cloned()
        .with_context(|| format!("missing --{name}"))
}

fn simulator_config(args: &ArgMatches, operations: &str) -> anyhow::Result<SimulatorConfig> {
    let defaults = SimulatorConfig::default();
    let mut coordinator = match args.get_one::<PathBuf>("config") {
        Some(path) => CoordinatorConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => defaults.coordinator.clone(),
    };
    if let Some(ms) = args.get_one::<u64>("debounce-ms") {
        coordinator = coordinator.with_debounce(Duration::from_millis(*ms));
    }

    Ok(SimulatorConfig {
        seed: arg(args, "seed")?,
        records: arg(args, "records")?,
        operations: arg(args, operations)?,
        failure_rate: arg(args, "failure-rate")?,
        latency_ms: arg(args, "latency-ms")?,
        coordinator,
        ..defaults
    })
}

fn print_report(report: &SimulatorReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report.generate_text());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Command::new("dash-sim")
        .version(dash_sim::VERSION)
        .about("Dashboard optimistic-update simulator")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(workload_args(
            Command::new("grid")
                .about("Type edit bursts into an expense grid")
                .arg(
                    Arg::new("keystrokes")
                        .long("keystrokes")
                        .default_value("6")
                        .value_parser(value_parser!(u32))
                        .help("Longest typing burst"),
                ),
            "bursts",
        ))
        .subcommand(workload_args(
            Command::new("pipeline").about("Drag cards across an opportunity board"),
            "moves",
        ));

    let matches = cli.get_matches();

    let (report, json) = match matches.subcommand() {
        Some(("grid", args)) => {
            let config = SimulatorConfig {
                max_keystrokes: arg(args, "keystrokes")?,
                ..simulator_config(args, "bursts")?
            };
            (run_grid(config).await?, args.get_flag("json"))
        }
        Some(("pipeline", args)) => {
            let config = simulator_config(args, "moves")?;
            (run_pipeline(config).await?, args.get_flag("json"))
        }
        _ => unreachable!("subcommand is required"),
    };

    print_report(&report, json)?;
    std::process::exit(if report.passed() { 0 } else { 1 });
}
