pub mod app;
pub mod cli;
pub mod config;
pub mod display;
pub mod event;
pub mod exposition;
pub mod filter;
pub mod labels;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod server;

use anyhow::{Context, bail};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub use app::{AppError, MetricsApp, MetricsPlugin};
pub use cli::{Cli, Commands, ConfigArgs, cli_parse};
pub use config::{AppSettings, ConfigError, MetricsConfig, MetricSpec, load_config_from_path};
pub use event::{Level, LogEvent, parse_event_line, read_events};
pub use filter::{CompiledFilter, Expr, FilterParseError};
pub use labels::{DefaultLabelValues, LabelAliases, LabelOutcome, LabelRenderer, LabelSpec};
pub use pipeline::{IngestReport, MetricPipeline, Observation};
pub use registry::{Counter, MetricRegistry, RegistryError};

/// Totals of feeding a stream of events through a pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestTotals {
    pub events: usize,
    pub rejected_lines: usize,
    pub report: IngestReport,
}

/// Feed newline-delimited JSON events through `handle`
pub fn ingest<R, F>(reader: R, mut handle: F) -> std::io::Result<IngestTotals>
where
    R: BufRead,
    F: FnMut(&LogEvent) -> IngestReport,
{
    let mut events = 0;
    let mut report = IngestReport::default();
    let rejected_lines = read_events(reader, |event| {
        events += 1;
        report += handle(&event);
    })?;

    Ok(IngestTotals {
        events,
        rejected_lines,
        report,
    })
}

fn open_input(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open event file '{}'", path.display()))?;
    Ok(BufReader::new(file))
}

/// Load and validate a configuration, then build a pipeline over a fresh
/// registry
pub fn build_pipeline(args: &ConfigArgs) -> anyhow::Result<MetricPipeline> {
    let config = load_config_from_path(&args.config)?;
    let specs = config.validate(&LabelAliases::default())?;

    let mut defaults = DefaultLabelValues::from_environment();
    if let Some(job) = args.job.as_ref().or(config.job.as_ref()) {
        defaults = defaults.with("job", job.clone());
    }

    let pipeline = MetricPipeline::build(
        specs,
        Arc::new(defaults),
        Arc::new(MetricRegistry::new()),
    )?;
    Ok(pipeline)
}

fn run_serve(
    config: &ConfigArgs,
    input: Option<&Path>,
    host: &str,
    port: u16,
    url: Option<&str>,
    bearer_token: Option<&str>,
) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    let settings = AppSettings {
        configuration: None,
        config_file: Some(config.config.clone()),
        listen_host: host.to_string(),
        port,
        url: url.map(str::to_string),
        bearer_token: bearer_token.map(str::to_string),
        job: config.job.clone(),
    };

    let mut app = MetricsApp::new(Box::new(server::TokioServerFactory::new(
        runtime.handle().clone(),
    )));
    app.initialize(&settings)
        .context("Failed to initialize exporter")?;

    let totals = match input {
        Some(path) => ingest(open_input(path)?, |e| app.handle_event(e))?,
        None => ingest(std::io::stdin().lock(), |e| app.handle_event(e))?,
    };
    info!(
        events = totals.events,
        incremented = totals.report.incremented,
        "event input finished; serving until interrupted"
    );

    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("Failed to wait for Ctrl-C")?;
    app.shutdown();
    Ok(())
}

fn run_replay(config: &ConfigArgs, input: &Path) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;
    let totals = ingest(open_input(input)?, |e| pipeline.handle_event(e))?;

    print!("{}", exposition::render(&pipeline.registry().snapshot()));
    eprintln!(
        "{}",
        display::format_ingest_summary(totals.events, totals.rejected_lines, &totals.report)
    );
    Ok(())
}

fn run_check(config: &ConfigArgs) -> anyhow::Result<()> {
    let metrics = load_config_from_path(&config.config)?;
    let specs = metrics.validate(&LabelAliases::default())?;

    let rows: Vec<display::CheckRow> = specs.iter().map(display::CheckRow::from_spec).collect();
    print!("{}", display::format_check_report(&rows));

    let failed = rows.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        bail!("{} metric filter(s) failed to compile", failed);
    }
    Ok(())
}

pub fn run() -> anyhow::Result<()> {
    let cli = cli_parse();
    logging::init(cli.verbose, cli.quiet);

    match &cli.command {
        Commands::Serve {
            config,
            input,
            host,
            port,
            url,
            bearer_token,
        } => run_serve(
            config,
            input.as_deref(),
            host,
            *port,
            url.as_deref(),
            bearer_token.as_deref(),
        ),
        Commands::Replay { config, input } => run_replay(config, input),
        Commands::Check { config } => run_check(config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_counts_events_and_bad_lines() {
        let input = "{\"@l\":\"Error\"}\n{oops\n{\"@l\":\"Information\"}\n";
        let totals = ingest(input.as_bytes(), |event| IngestReport {
            matched: usize::from(event.level == Level::Error),
            ..IngestReport::default()
        })
        .unwrap();

        assert_eq!(totals.events, 2);
        assert_eq!(totals.rejected_lines, 1);
        assert_eq!(totals.report.matched, 1);
    }
}
