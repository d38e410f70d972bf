//! harvester - one-shot collection of blockchain node metadata.
//!
//! Usage:
//!   harvester collect polkadot               # print the report to stdout
//!   harvester collect reth geth -o out.json  # write the report to a file
//!   harvester collect null --no-validate     # skip schema validation
//!   harvester list --plugin-dir ./plugins    # show available collectors
//!   harvester schema                         # print the bundled schema
//!
//! Logs go to stderr; stdout carries JSON only.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use harvester_core::schema::BUNDLED_SCHEMA;
use harvester_core::{
    AggregatedReport, CollectContext, Harvester, RunOptions, SchemaSource, load_collectors,
};

/// Collects identity metadata from blockchain nodes.
#[derive(Parser, Debug)]
#[command(
    name = "harvester",
    about = "Collects identity metadata from blockchain nodes",
    version = harvester_core::VERSION,
    arg_required_else_help = true
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory with collector manifests (*.json). May be repeated; later
    /// directories override earlier ones.
    #[arg(
        long = "plugin-dir",
        value_name = "DIR",
        global = true,
        env = "HARVESTER_PLUGIN_DIRS",
        value_delimiter = ','
    )]
    plugin_dirs: Vec<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run collectors and print the aggregated report.
    Collect {
        /// Collector names, in output order.
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,

        /// JSON Schema used instead of the bundled one.
        #[arg(long, value_name = "PATH")]
        schema: Option<PathBuf>,

        /// Write the report to this file instead of stdout.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Skip schema validation.
        #[arg(long)]
        no_validate: bool,
    },
    /// List registered collectors and their versions.
    List,
    /// Print the bundled JSON Schema.
    Schema,
}

/// Initializes logging to stderr. Default level is INFO, -q shows errors only.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["harvester", "harvester_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_options(schema: Option<PathBuf>, no_validate: bool) -> RunOptions {
    RunOptions {
        schema: schema.map(SchemaSource::Path).unwrap_or_default(),
        validate: !no_validate,
    }
}

/// Writes the pretty-printed report to `path`, creating parent directories.
fn write_report(report: &AggregatedReport, path: &Path) -> Result<(), String> {
    let text = serde_json::to_string_pretty(report)
        .map_err(|e| format!("cannot serialize report: {}", e))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
    }
    std::fs::write(path, text + "\n").map_err(|e| format!("cannot write {}: {}", path.display(), e))
}

fn production_context() -> CollectContext {
    match CollectContext::from_env() {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = %e, "cannot create RPC client");
            eprintln!("Error: cannot create RPC client: {}", e);
            std::process::exit(1);
        }
    }
}

fn collect(
    plugin_dirs: &[PathBuf],
    names: &[String],
    options: &RunOptions,
    output: Option<&Path>,
) -> i32 {
    let registry = load_collectors(plugin_dirs);
    let harvester = Harvester::new(&registry, production_context());
    let report = match harvester.collect_all(names, options) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "collection failed");
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = write_report(&report, path) {
                eprintln!("Error: {}", e);
                return 1;
            }
            info!(path = %path.display(), collectors = report.len(), "report written");
        }
        None => match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: cannot serialize report: {}", e);
                return 1;
            }
        },
    }

    if let Some(violation) = report.validation() {
        eprintln!("Error: {}", violation);
        return 1;
    }
    0
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let code = match args.command {
        Command::Collect {
            names,
            schema,
            output,
            no_validate,
        } => collect(
            &args.plugin_dirs,
            &names,
            &run_options(schema, no_validate),
            output.as_deref(),
        ),
        Command::List => {
            let registry = load_collectors(&args.plugin_dirs);
            for (name, version) in registry.describe(&production_context()) {
                println!("{:<20} {}", name, version);
            }
            0
        }
        Command::Schema => {
            print!("{}", BUNDLED_SCHEMA);
            0
        }
    };
    std::process::exit(code);
}
