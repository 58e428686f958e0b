use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ironsplit::{
    AbTesting, Clock, FileStorage, FixedClock, ResultEvent, SystemClock, TestRegistry,
    TracingSink,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ironsplit", about = "Inspect and exercise the site's A/B tests")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Registry file or directory of JSON definitions. Built-in tests when unset.
    #[arg(long, global = true, env = "IRONSPLIT_REGISTRY")]
    registry: Option<PathBuf>,

    /// Directory holding the simulated visitor session.
    #[arg(
        long,
        global = true,
        env = "IRONSPLIT_SESSION_DIR",
        default_value = "./.ironsplit-session"
    )]
    session_dir: PathBuf,

    /// Evaluate eligibility as of this day (YYYY-MM-DD) instead of today.
    #[arg(long, global = true)]
    date: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum Command {
    /// Check every definition and print its status
    Validate,
    /// List the active tests targeting a page
    Page { path: String },
    /// Resolve (and persist) the session's variant for a test
    Assign { test: String, path: String },
    /// Append a result event to the session log
    Record {
        test: String,
        variant: String,
        metric: String,
        #[arg(long)]
        value: Option<f64>,
    },
    /// Print the per-variant summary of recorded results
    Results {
        test: String,
        /// Print the raw events instead of the summary
        #[arg(long)]
        raw: bool,
    },
}

fn load_registry(cli: &Cli) -> Result<TestRegistry, ironsplit::AbTestError> {
    let registry = match &cli.registry {
        Some(path) => TestRegistry::load(path)?,
        None => TestRegistry::builtin(),
    };
    tracing::debug!(tests = registry.len(), "registry loaded");
    Ok(registry)
}

fn clock(cli: &Cli) -> Arc<dyn Clock> {
    match cli.date {
        Some(day) => Arc::new(FixedClock::on(day)),
        None => Arc::new(SystemClock),
    }
}

fn build_service(cli: &Cli) -> Result<AbTesting, Box<dyn std::error::Error>> {
    let registry = load_registry(cli)?;
    let storage = FileStorage::new(&cli.session_dir)?;
    Ok(AbTesting::new(registry)
        .with_storage(Arc::new(storage))
        .with_sink(Arc::new(TracingSink))
        .with_clock(clock(cli)))
}

fn run_validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let definitions = match &cli.registry {
        Some(path) => TestRegistry::read_definitions(path),
        None => Ok(TestRegistry::builtin().iter().cloned().collect()),
    };
    let definitions = match definitions {
        Ok(definitions) => definitions,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    // insert, not from_definitions: every invalid entry gets reported below
    let mut registry = TestRegistry::new();
    let mut failed = false;
    for definition in definitions {
        if let Err(e) = registry.insert(definition) {
            eprintln!("ERROR: {}", e);
            failed = true;
        }
    }

    let today = clock(cli).today();
    for test in registry.iter() {
        let state = if test.is_live(today) { "live" } else { "idle" };
        println!(
            "{}\t{:?}\t{}\t{} variants",
            test.test_name,
            test.status,
            state,
            test.variants.len()
        );
    }
    let problems = registry.problems();
    for (name, err) in &problems {
        eprintln!("ERROR: {}: {}", name, err);
    }
    if failed || !problems.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_page(cli: &Cli, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let svc = build_service(cli)?;
    for test in svc.get_tests_for_page(path) {
        let ids: Vec<&str> = test.variants.iter().map(|v| v.id.as_str()).collect();
        println!("{}\t{}", test.test_name, ids.join(","));
    }
    Ok(())
}

fn run_assign(cli: &Cli, test: &str, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let svc = build_service(cli)?;
    match svc.variant_for(test, path) {
        Some(variant) => {
            println!("{}", variant.id);
            Ok(())
        }
        None => {
            eprintln!("ERROR: test '{}' is not active", test);
            std::process::exit(1);
        }
    }
}

fn run_record(
    cli: &Cli,
    test: &str,
    variant: &str,
    metric: &str,
    value: Option<f64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let svc = build_service(cli)?;
    let timestamp = clock(cli).now_ms();
    svc.record_test_result(ResultEvent::new(test, variant, metric, value, timestamp));
    Ok(())
}

fn run_results(cli: &Cli, test: &str, raw: bool) -> Result<(), Box<dyn std::error::Error>> {
    let svc = build_service(cli)?;
    let out = if raw {
        serde_json::to_string_pretty(&svc.get_test_results(test))?
    } else {
        serde_json::to_string_pretty(&svc.summarize_results(test))?
    };
    println!("{}", out);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match &cli.command {
        Command::Validate => run_validate(&cli),
        Command::Page { path } => run_page(&cli, path),
        Command::Assign { test, path } => run_assign(&cli, test, path),
        Command::Record {
            test,
            variant,
            metric,
            value,
        } => run_record(&cli, test, variant, metric, *value),
        Command::Results { test, raw } => run_results(&cli, test, *raw),
    }
}
