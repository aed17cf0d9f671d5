//! Storebench CLI - run the housing scenarios against several data stores.

mod args;
mod stores;

use clap::Parser;
use storebench_backends::housing;
use storebench_core::{Harness, ScenarioRegistry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::args::{Args, OutputFormat, RunConfig};

fn main() {
    // Logs go to stderr so a JSON report on stdout stays parseable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storebench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if let Err(e) = run(args.into_config()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(config: RunConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = match &config.scenarios {
        Some(path) => ScenarioRegistry::from_path(path)?,
        None => housing::registry()?,
    };
    tracing::info!(
        scenarios = registry.len(),
        backends = config.kinds.len(),
        report = %config.harness.report_path.display(),
        "configuration loaded"
    );

    for (scenario, backend) in registry.coverage_gaps(&config.harness.backends) {
        tracing::warn!(%backend, scenario, "no operation defined; cell will be unavailable");
    }

    // Keep the stores (and their scratch directory) alive for the whole run.
    let stores = stores::open(&config.kinds, &config.stores)?;

    let mut harness = Harness::new(config.harness.clone(), registry);
    for connector in stores.connectors {
        harness.add_connector(connector);
    }

    let report = harness.run()?;

    match config.format {
        OutputFormat::Table => println!("{}", report.render_table()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    report.write_artifact(&config.harness.report_path)?;
    tracing::info!(path = %config.harness.report_path.display(), "report written");

    Ok(())
}
