use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use netrig::cli::commands::{self, RunOptions};

#[derive(Parser)]
#[command(
    name = "netrig",
    about = "netrig — test orchestration for network device labs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct RunArgs {
    /// Suite file to execute
    suite: PathBuf,

    /// Topology file (default: <suite stem>.topo.yaml next to the suite)
    #[arg(long)]
    topo: Option<PathBuf>,

    /// Directory runs are recorded under
    #[arg(long, default_value = "netrig-logs")]
    log_dir: PathBuf,

    /// Failure policy: continue or abort
    #[arg(long, default_value = "continue")]
    policy: String,

    /// Units executed concurrently within a wave
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Per-unit timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Extra attempts for errored units
    #[arg(long, default_value_t = 1)]
    retries: usize,

    /// Device assignment: first-fit or round-robin
    #[arg(long, default_value = "first-fit")]
    assignment: String,

    /// Substitute echo sessions for every device behavior
    #[arg(long)]
    dry_run: bool,

    /// Parameter override (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Also write a JUnit XML report to this path
    #[arg(long, value_name = "FILE")]
    junit: Option<PathBuf>,
}

impl RunArgs {
    fn into_options(self, debug: bool) -> RunOptions {
        RunOptions {
            suite: self.suite,
            topo: self.topo,
            log_dir: self.log_dir,
            policy: self.policy,
            workers: self.workers,
            timeout: self.timeout,
            retries: self.retries,
            assignment: self.assignment,
            dry_run: self.dry_run,
            params: self.params,
            junit: self.junit,
            debug,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a suite against its topology
    Run {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Execute a suite, gating each unit on stdin before it runs
    Debug {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Print the directory of the most recent run
    Lastlog {
        /// Directory runs are recorded under
        #[arg(long, default_value = "netrig-logs")]
        log_dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { args }) => execute(args.into_options(false)),
        Some(Commands::Debug { args }) => execute(args.into_options(true)),
        Some(Commands::Lastlog { log_dir }) => {
            let _ = commands::init_tracing(false);
            match commands::run_lastlog(&log_dir) {
                Ok(path) => print!("{path}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(2);
                }
            }
        }
        None => {
            // No subcommand — clap will show help via the derive
            Cli::parse_from(["netrig", "--help"]);
        }
    }
}

fn execute(options: RunOptions) {
    let run_log = commands::init_tracing(true);
    match commands::run_run(options, &run_log) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    }
}
