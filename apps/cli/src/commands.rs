//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use orgscan_core::{RunController, RunReporter, build_query};
use orgscan_search::{SerpApiClient, SerpApiOptions};
use orgscan_sheets::{CsvSheet, GoogleSheet, GoogleSheetOptions, SheetStore};
use orgscan_shared::topics::{all_topics, find_topic};
use orgscan_shared::{
    AppConfig, OrgScanError, OutcomeKind, Row, RowOutcome, RunConfig, RunStatus, RunSummary,
    SheetBackend, config_file_path, init_config_at, journal_path, load_config, load_config_from,
    read_secret,
};
use orgscan_storage::Journal;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// orgscan: classify organizations from web search evidence.
#[derive(Parser)]
#[command(
    name = "orgscan",
    version,
    about = "Search the web for each organization in a sheet and record whether it uses a technology.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.orgscan/orgscan.toml).
    #[arg(long, env = "ORGSCAN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Classify the organizations in a sheet for one topic.
    Run(RunArgs),

    /// Print the search query that would be sent for an organization.
    Query {
        /// Topic profile name.
        #[arg(short, long)]
        topic: String,

        /// Organization name.
        name: String,
    },

    /// List available topic profiles.
    Topics,

    /// Show journaled runs.
    History {
        /// Number of runs to list.
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Show per-row outcomes of one run.
        #[arg(long)]
        run: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `orgscan run`. Anything left unset falls back to the config file.
#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Topic profile name (see `orgscan topics`).
    #[arg(short, long)]
    pub topic: String,

    /// Leave rows that already carry a verdict untouched.
    #[arg(long)]
    pub skip_existing: bool,

    /// Stop after examining this many rows (0 = unlimited).
    #[arg(long)]
    pub max_rows: Option<usize>,

    /// Stop after classifying this many new rows (0 = unlimited).
    #[arg(long)]
    pub max_new_rows: Option<usize>,

    /// Seconds to wait after every search request.
    #[arg(long)]
    pub delay: Option<f64>,

    /// Search results requested per organization.
    #[arg(long)]
    pub results: Option<u32>,

    /// Local CSV file to classify.
    #[arg(long, conflicts_with = "sheet_id")]
    pub csv: Option<PathBuf>,

    /// Google spreadsheet ID to classify.
    #[arg(long)]
    pub sheet_id: Option<String>,

    /// Worksheet (tab) name within the spreadsheet.
    #[arg(long)]
    pub sheet_name: Option<String>,

    /// Header of the column holding organization names.
    #[arg(long)]
    pub name_column: Option<String>,

    /// Do not record this run in the journal.
    #[arg(long)]
    pub no_journal: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "orgscan=info",
        1 => "orgscan=debug",
        _ => "orgscan=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone();
    match cli.command {
        Command::Run(args) => cmd_run(config_path.as_deref(), args).await,
        Command::Query { topic, name } => cmd_query(config_path.as_deref(), &topic, &name),
        Command::Topics => cmd_topics(config_path.as_deref()),
        Command::History { limit, run } => {
            cmd_history(config_path.as_deref(), limit, run.as_deref()).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(config_path.as_deref(), force),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn load(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Fold `run` flags into the loaded config; flags win.
fn apply_run_args(config: &mut AppConfig, args: &RunArgs) {
    if args.skip_existing {
        config.run.skip_existing = true;
    }
    if let Some(n) = args.max_rows {
        config.run.max_rows_examined = n;
    }
    if let Some(n) = args.max_new_rows {
        config.run.max_new_rows = n;
    }
    if let Some(delay) = args.delay {
        config.run.request_delay_seconds = delay;
    }
    if let Some(n) = args.results {
        config.run.result_count = n;
    }
    if let Some(path) = &args.csv {
        config.sheet.backend = SheetBackend::Csv;
        config.sheet.path = Some(path.clone());
    }
    if let Some(id) = &args.sheet_id {
        config.sheet.backend = SheetBackend::Google;
        config.sheet.spreadsheet_id = Some(id.clone());
    }
    if let Some(name) = &args.sheet_name {
        config.sheet.sheet_name = name.clone();
    }
    if let Some(column) = &args.name_column {
        config.sheet.name_column = column.clone();
    }
    if args.no_journal {
        config.journal.enabled = false;
    }
}

/// Build the configured sheet backend. Credentials are read here, once.
fn open_sheet(config: &AppConfig, run: &RunConfig) -> Result<Box<dyn SheetStore>> {
    match config.sheet.backend {
        SheetBackend::Csv => {
            let path = config
                .sheet
                .path
                .clone()
                .ok_or_else(|| eyre!("no CSV file given; pass --csv or set [sheet].path"))?;
            Ok(Box::new(CsvSheet::open(path)?))
        }
        SheetBackend::Google => {
            let spreadsheet_id = config.sheet.spreadsheet_id.clone().ok_or_else(|| {
                eyre!("no spreadsheet given; pass --sheet-id or set [sheet].spreadsheet_id")
            })?;
            let access_token = read_secret(&config.sheet.token_env, "Google access token")?;
            Ok(Box::new(GoogleSheet::new(GoogleSheetOptions {
                endpoint: config.sheet.endpoint.clone(),
                spreadsheet_id,
                sheet_name: config.sheet.sheet_name.clone(),
                access_token,
                timeout: run.request_timeout,
            })?))
        }
    }
}

async fn open_journal(config: &AppConfig) -> Option<Journal> {
    if !config.journal.enabled {
        return None;
    }
    let path = match journal_path(config) {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "journal disabled");
            return None;
        }
    };
    match Journal::open(&path).await {
        Ok(journal) => Some(journal),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "journal disabled");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let mut config = load(config_path)?;
    apply_run_args(&mut config, &args);
    config.run.validate()?;

    let topic = find_topic(&args.topic, &config.topics)?;
    let run_config = RunConfig::from(&config);

    // Resolve every credential before the first row is touched.
    let api_key = read_secret(&config.search.api_key_env, "SerpAPI key")?;
    let provider = SerpApiClient::new(SerpApiOptions {
        endpoint: config.search.endpoint.clone(),
        engine: config.search.engine.clone(),
        api_key,
        delay: run_config.request_delay,
        timeout: run_config.request_timeout,
    })?;
    let sheet = open_sheet(&config, &run_config)?;
    let journal = open_journal(&config).await;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current row");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    info!(
        topic = %topic.name,
        sheet = %sheet.describe(),
        skip_existing = run_config.skip_existing,
        max_rows_examined = ?run_config.max_rows_examined,
        max_new_rows = ?run_config.max_new_rows,
        "starting classification"
    );

    let mut controller = RunController::new(
        &provider,
        sheet.as_ref(),
        &topic,
        &config.sheet.name_column,
        &run_config,
    )
    .with_cancel_flag(cancel);
    if let Some(journal) = &journal {
        controller = controller.with_journal(journal);
    }

    let reporter = CliProgress::new();
    let summary = controller.run(&reporter).await?;

    print_summary(&topic.name, &summary);

    match summary.status {
        RunStatus::Done => Ok(()),
        RunStatus::Aborted { reason } => Err(eyre!("run aborted: {reason}")),
    }
}

fn print_summary(topic: &str, summary: &RunSummary) {
    println!();
    match &summary.status {
        RunStatus::Done => println!("  Run complete ({topic})"),
        RunStatus::Aborted { reason } => println!("  Run aborted ({topic}): {reason}"),
    }
    println!("  Examined:   {}", summary.examined);
    println!(
        "  Classified: {} ({} TRUE)",
        summary.classified,
        summary.positives()
    );
    println!("  Skipped:    {}", summary.skipped);
    println!("  Errored:    {}", summary.errored);
    println!("  No results: {}", summary.no_results);
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());

    let failures: Vec<&RowOutcome> = summary
        .outcomes
        .iter()
        .filter(|o| matches!(o.kind, OutcomeKind::Failed { .. }))
        .collect();
    if !failures.is_empty() {
        println!();
        println!("  Failed rows:");
        for outcome in failures {
            if let OutcomeKind::Failed { error } = &outcome.kind {
                println!("    row {:>5}  {}: {error}", outcome.row, outcome.name);
            }
        }
    }
    println!();
}

fn cmd_query(config_path: Option<&Path>, topic: &str, name: &str) -> Result<()> {
    let config = load(config_path)?;
    let topic = find_topic(topic, &config.topics)?;
    println!("{}", build_query(name, &topic));
    Ok(())
}

fn cmd_topics(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    for topic in all_topics(&config.topics) {
        println!("{}", topic.name);
        if !topic.description.is_empty() {
            println!("  {}", topic.description);
        }
        println!(
            "  columns:    {} / {}",
            topic.verdict_column, topic.evidence_column
        );
        for (i, group) in topic.required_groups.iter().enumerate() {
            println!("  group {}:    {}", i + 1, group.join(", "));
        }
        if !topic.exclusions.is_empty() {
            println!("  exclusions: {}", topic.exclusions.join(", "));
        }
        println!();
    }
    Ok(())
}

async fn cmd_history(config_path: Option<&Path>, limit: usize, run: Option<&str>) -> Result<()> {
    let config = load(config_path)?;
    let path = journal_path(&config)?;
    let journal = match Journal::open_readonly(&path).await {
        Ok(journal) => journal,
        Err(OrgScanError::Storage(_)) if !path.exists() => {
            println!("No runs recorded yet ({}).", path.display());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(run_id) = run {
        let record = journal
            .get_run(run_id)
            .await?
            .ok_or_else(|| eyre!("no run with id '{run_id}'"))?;
        println!(
            "{}  {}  {}  {}",
            record.id,
            record.topic,
            record.status,
            record.sheet
        );
        for outcome in journal.outcomes_for_run(run_id).await? {
            let detail = match &outcome.kind {
                OutcomeKind::Skipped => "skipped".to_string(),
                OutcomeKind::Classified {
                    verdict,
                    evidence,
                    no_results,
                } => {
                    let mut s = orgscan_shared::verdict_cell_value(*verdict).to_string();
                    if let Some(link) = evidence {
                        s.push_str(&format!("  {link}"));
                    }
                    if *no_results {
                        s.push_str("  (no results)");
                    }
                    s
                }
                OutcomeKind::Failed { error } => format!("failed: {error}"),
            };
            println!("  row {:>5}  {:<40}  {detail}", outcome.row, outcome.name);
        }
        return Ok(());
    }

    let runs = journal.list_runs(limit).await?;
    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }
    for record in runs {
        let status = match &record.abort_reason {
            Some(reason) => format!("{} ({reason})", record.status),
            None => record.status.clone(),
        };
        println!(
            "{}  {}  {:<18} {:<30} examined {:>4}  classified {:>4}  skipped {:>4}  errored {:>3}  {}",
            record.id,
            record.started_at.format("%Y-%m-%d %H:%M"),
            record.topic,
            record.sheet,
            record.examined,
            record.classified,
            record.skipped,
            record.errored,
            status
        );
    }
    Ok(())
}

fn cmd_config_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    if path.exists() && !force {
        return Err(eyre!(
            "config already exists at {}; pass --force to overwrite",
            path.display()
        ));
    }
    init_config_at(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar over the sheet's rows.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            bar.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        bar.set_message("Reading sheet");
        Self { bar }
    }
}

impl RunReporter for CliProgress {
    fn started(&self, topic: &str, rows: usize) {
        self.bar.set_length(rows as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        {
            self.bar.set_style(style.progress_chars("=> "));
        }
        self.bar.set_message(format!("{topic}: {rows} rows"));
    }

    fn row_started(&self, row: &Row) {
        self.bar
            .set_message(format!("row {} {}", row.number, row.name));
    }

    fn retrying(&self, row: &Row, attempt: u32, error: &OrgScanError) {
        self.bar.set_message(format!(
            "row {} retry {attempt}: {error}",
            row.number
        ));
    }

    fn row_finished(&self, _outcome: &RowOutcome) {
        self.bar.inc(1);
    }

    fn done(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("valid args")
    }

    #[test]
    fn run_flags_parse() {
        let cli = parse(&[
            "orgscan",
            "-vv",
            "run",
            "--topic",
            "vegetation",
            "--skip-existing",
            "--max-new-rows",
            "5",
            "--csv",
            "orgs.csv",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.topic, "vegetation");
        assert!(args.skip_existing);
        assert_eq!(args.max_new_rows, Some(5));
        assert_eq!(args.csv, Some(PathBuf::from("orgs.csv")));
    }

    #[test]
    fn csv_and_sheet_id_conflict() {
        let result = Cli::try_parse_from([
            "orgscan", "run", "--topic", "x", "--csv", "a.csv", "--sheet-id", "abc",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn flags_override_config() {
        let mut config = AppConfig::default();
        config.run.max_new_rows = 50;
        let args = RunArgs {
            topic: "vegetation".into(),
            skip_existing: true,
            max_new_rows: Some(0),
            delay: Some(0.25),
            sheet_id: Some("sheet-123".into()),
            no_journal: true,
            ..RunArgs::default()
        };
        apply_run_args(&mut config, &args);

        assert!(config.run.skip_existing);
        assert_eq!(config.run.max_new_rows, 0);
        assert_eq!(config.sheet.backend, SheetBackend::Google);
        assert_eq!(config.sheet.spreadsheet_id.as_deref(), Some("sheet-123"));
        assert!(!config.journal.enabled);

        let run = RunConfig::from(&config);
        assert_eq!(run.max_new_rows, None);
        assert_eq!(run.request_delay, std::time::Duration::from_millis(250));
    }

    #[test]
    fn oversized_delay_flag_is_rejected() {
        let mut config = AppConfig::default();
        let args = RunArgs {
            topic: "vegetation".into(),
            delay: Some(1e20),
            ..RunArgs::default()
        };
        apply_run_args(&mut config, &args);
        let err = config.run.validate().unwrap_err();
        assert!(err.to_string().contains("request_delay_seconds"));
    }

    #[test]
    fn unset_flags_keep_config() {
        let mut config = AppConfig::default();
        config.run.result_count = 20;
        config.sheet.name_column = "Utility".into();
        apply_run_args(
            &mut config,
            &RunArgs {
                topic: "vegetation".into(),
                ..RunArgs::default()
            },
        );
        assert_eq!(config.run.result_count, 20);
        assert_eq!(config.sheet.name_column, "Utility");
        assert!(config.journal.enabled);
    }

    #[test]
    fn csv_backend_requires_path() {
        let config = AppConfig::default();
        let run = RunConfig::from(&config);
        let err = open_sheet(&config, &run).err().expect("missing path");
        assert!(err.to_string().contains("--csv"));
    }
}
