use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chainlab::batch::{self, BatchProgress};
use chainlab::config::Config;
use chainlab::credentials::KeyringTokenStore;
use chainlab::orchestrator::{self, AppOutput};
use chainlab::store::{self, applications, runs};
use chainlab::table::Table;
use chainlab::tag_parser::{self, NO_DATA_EXTRACTED};
use chainlab::{Application, ComponentKind, DbPool, HttpBackend, Orchestrator, StopHandle};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

/// Build and run chains of AI components from the command line.
#[derive(Parser, Debug)]
#[command(name = "chainlab", author, version, about, long_about = None)]
struct Cli {
    /// Path to a config.toml (defaults to CHAINLAB_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in and keep the session token in the OS keyring
    Login {
        #[arg(long)]
        email: String,

        /// Read from stdin when omitted
        #[arg(long, env = "CHAINLAB_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// End the session and forget the stored token
    Logout,

    /// Run an application's chain once
    Run {
        #[command(flatten)]
        source: AppSource,

        /// Text for an input component, as `Title=value` (repeatable)
        #[arg(long = "var", value_name = "TITLE=VALUE")]
        vars: Vec<String>,

        /// Local CSV/TSV/TXT file for the batch input
        #[arg(long)]
        table: Option<PathBuf>,

        /// Table row fed to the batch input (1-based)
        #[arg(long, default_value_t = 1)]
        row: usize,
    },

    /// Run an application's chain once per table row
    Batch {
        #[command(flatten)]
        source: AppSource,

        /// Local table file; without it the batch input's uploaded file is used
        #[arg(long)]
        table: Option<PathBuf>,

        /// Write per-row results to a .csv or .json file
        #[arg(long)]
        out: Option<PathBuf>,

        /// Stop the job once this many rows have failed (at least 1)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        max_failures: Option<u64>,
    },

    /// Extract the body of a `<tag>...</tag>` pair
    Parse {
        #[arg(long)]
        tag: String,

        /// Text to search; read from stdin when omitted
        #[arg(long)]
        text: Option<String>,
    },

    /// Download an application to a file and the local store
    Pull {
        app_id: String,

        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Upload an application file to the backend
    Push { file: PathBuf },

    /// List applications in the local store
    Apps,

    /// Show recent runs
    History {
        #[arg(long)]
        app: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show the remaining quota
    Quota,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct AppSource {
    /// Application id (local store first, then the backend)
    #[arg(long)]
    app: Option<String>,

    /// Application JSON file
    #[arg(long)]
    file: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(err) = execute(cli) {
        let message = format!("{err:#}");
        if message.starts_with("Error:") {
            eprintln!("{}", message.red());
        } else {
            eprintln!("{} {}", "Error:".red().bold(), message);
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CHAINLAB_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    // Parsing is purely local: no config, keyring or database needed.
    if let Commands::Parse { tag, text } = &cli.command {
        return parse(tag, text.clone());
    }

    let session = Session::open(cli.config.as_deref())?;
    match cli.command {
        Commands::Login { email, password } => session.login(&email, password),
        Commands::Logout => session.logout(),
        Commands::Run {
            source,
            vars,
            table,
            row,
        } => session.run(&source, &vars, table.as_deref(), row),
        Commands::Batch {
            source,
            table,
            out,
            max_failures,
        } => session.batch(&source, table.as_deref(), out.as_deref(), max_failures),
        Commands::Pull { app_id, out } => session.pull(&app_id, out),
        Commands::Push { file } => session.push(&file),
        Commands::Apps => session.apps(),
        Commands::History { app, limit } => session.history(app.as_deref(), limit),
        Commands::Quota => session.quota(),
        Commands::Parse { .. } => Ok(()),
    }
}

fn parse(tag: &str, text: Option<String>) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };

    match tag_parser::extract_tag(&text, tag.trim()) {
        Some(body) => println!("{body}"),
        None => eprintln!("{}", NO_DATA_EXTRACTED.yellow()),
    }
    Ok(())
}

// ============================================================================
// Session: config, credentials, backend and local store
// ============================================================================

struct Session {
    tokens: Arc<KeyringTokenStore>,
    backend: HttpBackend,
    pool: DbPool,
}

impl Session {
    fn open(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load(config_path)?;
        let tokens = Arc::new(KeyringTokenStore::new());
        let backend = HttpBackend::new(&config, tokens.clone());
        let pool = store::open_pool(&config.database_path())?;
        tracing::debug!(base_url = %config.base_url, "session ready");
        Ok(Self {
            tokens,
            backend,
            pool,
        })
    }

    fn login(&self, email: &str, password: Option<String>) -> Result<()> {
        let password = match password {
            Some(password) => password,
            None => prompt("Password: ")?,
        };

        let session = self.backend.login(email, &password)?;
        self.tokens
            .save(&session.token, Some(session.username.as_str()))
            .context("Failed to store the session token")?;
        println!("{} {}", "Logged in as".green(), session.username.bold());
        Ok(())
    }

    fn logout(&self) -> Result<()> {
        if let Err(err) = self.backend.logout() {
            tracing::warn!(error = %err, "backend logout failed; clearing the local token anyway");
        }
        self.tokens.clear().context("Failed to clear the session token")?;
        println!("{}", "Logged out".green());
        Ok(())
    }

    fn run(&self, source: &AppSource, vars: &[String], table: Option<&Path>, row: usize) -> Result<()> {
        let mut application = self.load_application(source)?;
        let chain = &mut application.chain;

        for var in vars {
            let (title, value) = var
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected TITLE=VALUE, got '{var}'"))?;
            let id = chain
                .find_by_title(title)
                .filter(|component| component.kind == ComponentKind::TextInput)
                .map(|component| component.id)
                .ok_or_else(|| anyhow!("No text input titled '{title}'"))?;
            chain.set_user_input(id, value)?;
        }

        let row = row.checked_sub(1).ok_or_else(|| anyhow!("--row starts at 1"))?;
        if let Some(path) = table {
            attach_local_table(&mut application, path)?;
        }
        if let Some(batch) = application.chain.batch_input_mut() {
            batch.select_row(row);
        }

        let result = Orchestrator::new(&self.backend).run(&mut application.chain, &StopHandle::new());
        let outputs = orchestrator::app_outputs(&application.chain);
        print_outputs(&outputs);

        let conn = self.pool.get()?;
        let record = runs::record_interactive(
            &conn,
            self.stored_app_id(&application)?.as_deref(),
            &application.app_name,
            &result,
            &outputs,
        )?;
        tracing::debug!(run = %record.id, status = record.status.as_str(), "run recorded");

        let report = result?;
        if report.stopped {
            println!("{}", "Stopped.".yellow());
        }
        Ok(())
    }

    fn batch(
        &self,
        source: &AppSource,
        table: Option<&Path>,
        out: Option<&Path>,
        max_failures: Option<u64>,
    ) -> Result<()> {
        let mut application = self.load_application(source)?;
        if let Some(path) = table {
            attach_local_table(&mut application, path)?;
        }

        let job = StopHandle::new();
        let progress = batch::run_batch(&self.backend, &mut application.chain, &job, |progress| {
            eprintln!(
                "{} {}/{} ({} failed)",
                "row".dimmed(),
                progress.processed(),
                progress.total,
                progress.failed
            );
            if failure_limit_reached(progress.failed, max_failures) {
                job.stop();
            }
        })?;

        let conn = self.pool.get()?;
        let record = runs::record_batch(
            &conn,
            self.stored_app_id(&application)?.as_deref(),
            &application.app_name,
            &progress,
        )?;

        for failure in &progress.failures {
            eprintln!("{} {}", format!("row {}:", failure.row + 1).red(), failure.message);
        }
        println!(
            "{} {} done, {} failed, {} total ({})",
            "Batch finished:".bold(),
            progress.done,
            progress.failed,
            progress.total,
            record.status.as_str()
        );

        if let Some(path) = out {
            let titles: Vec<String> = orchestrator::app_outputs(&application.chain)
                .into_iter()
                .map(|output| output.title)
                .collect();
            write_batch_results(path, &progress, &titles)?;
            println!("Results written to {}", path.display());
        }
        Ok(())
    }

    fn pull(&self, app_id: &str, out: Option<PathBuf>) -> Result<()> {
        let application = self.backend.load_application(app_id)?;
        let path = out.unwrap_or_else(|| PathBuf::from(format!("{app_id}.json")));

        let wire = application.to_wire()?;
        fs::write(&path, serde_json::to_string_pretty(&wire)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        let conn = self.pool.get()?;
        applications::upsert(&conn, &application)?;

        println!(
            "Pulled {} ({} components) to {}",
            application.app_name.bold(),
            application.chain.len(),
            path.display()
        );
        Ok(())
    }

    fn push(&self, file: &Path) -> Result<()> {
        let application = read_application_file(file)?;
        application.validate()?;

        let stored = self.backend.save_application(&application)?;
        let conn = self.pool.get()?;
        let id = applications::upsert(&conn, &stored)?;
        println!("Saved {} as {}", stored.app_name.bold(), id);
        Ok(())
    }

    fn apps(&self) -> Result<()> {
        let conn = self.pool.get()?;
        let summaries = applications::list(&conn)?;
        if summaries.is_empty() {
            println!("No applications stored locally. Use `chainlab pull <id>`.");
        }
        for app in summaries {
            println!(
                "{}  {}  {} components  {}",
                app.id.dimmed(),
                app.name.bold(),
                app.components,
                app.updated_at.format("%Y-%m-%d %H:%M")
            );
        }
        Ok(())
    }

    fn history(&self, app: Option<&str>, limit: usize) -> Result<()> {
        let conn = self.pool.get()?;
        let records = runs::list(&conn, app, limit)?;
        if records.is_empty() {
            println!("No runs recorded.");
        }
        for run in records {
            let status = match run.status {
                runs::RunOutcome::Completed => run.status.as_str().green(),
                runs::RunOutcome::Failed => run.status.as_str().red(),
                _ => run.status.as_str().yellow(),
            };
            println!(
                "{}  {}  {:<11}  {:<9}  {}/{}  {}",
                run.created_at.format("%Y-%m-%d %H:%M:%S"),
                &run.id[..8.min(run.id.len())],
                run.kind.as_str(),
                status,
                run.done,
                run.total,
                run.app_name
            );
            if let Some(error) = run.error.as_deref().and_then(|e| e.lines().next()) {
                println!("    {}", error.dimmed());
            }
        }
        Ok(())
    }

    fn quota(&self) -> Result<()> {
        let quota = self.backend.check_quota()?;
        println!(
            "{} {} (used {})",
            "Quota available:".bold(),
            quota.quota_available,
            quota.quota_used
        );
        Ok(())
    }

    fn load_application(&self, source: &AppSource) -> Result<Application> {
        if let Some(path) = &source.file {
            return read_application_file(path);
        }
        let app_id = source
            .app
            .as_deref()
            .ok_or_else(|| anyhow!("Pass --app or --file"))?;

        let conn = self.pool.get()?;
        if let Some(application) = applications::load(&conn, app_id)? {
            return Ok(application);
        }
        tracing::info!(app_id, "application not stored locally, loading from backend");
        let application = self.backend.load_application(app_id)?;
        applications::upsert(&conn, &application)?;
        Ok(application)
    }

    /// Runs reference an application only when it is in the local store.
    fn stored_app_id(&self, application: &Application) -> Result<Option<String>> {
        let Some(id) = application.app_id.as_deref() else {
            return Ok(None);
        };
        let conn = self.pool.get()?;
        Ok(applications::load(&conn, id)?.map(|_| id.to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn read_application_file(path: &Path) -> Result<Application> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse JSON from {}", path.display()))?;
    Application::from_wire(value).with_context(|| format!("Invalid application in {}", path.display()))
}

fn attach_local_table(application: &mut Application, path: &Path) -> Result<()> {
    let table = Table::from_path(path)
        .with_context(|| format!("Failed to load table {}", path.display()))?;
    let batch = application
        .chain
        .batch_input_mut()
        .ok_or_else(|| anyhow!("The chain has no batch input to receive {}", path.display()))?;
    batch.attach_table(table);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{label}");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    let value = line.trim_end_matches(&['\r', '\n'][..]).to_string();
    if value.is_empty() {
        bail!("No password given");
    }
    Ok(value)
}

fn print_outputs(outputs: &[AppOutput]) {
    for output in outputs {
        println!("{}", output.title.bold());
        match &output.output {
            Some(value) if !value.is_empty() => println!("{}", value.display_text()),
            _ => println!("{}", "(no output)".dimmed()),
        }
        if let Some(notice) = &output.notice {
            println!("{}", notice.yellow());
        }
        println!();
    }
}

/// A limit of 0 never triggers; clap already rejects it on the command line.
fn failure_limit_reached(failed: usize, limit: Option<u64>) -> bool {
    match limit {
        Some(limit) if limit > 0 => failed as u64 >= limit,
        _ => false,
    }
}

fn write_batch_results(path: &Path, progress: &BatchProgress, titles: &[String]) -> Result<()> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, progress)?;
        return Ok(());
    }

    let mut rows: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for result in &progress.results {
        let mut record = vec![(result.row + 1).to_string(), "completed".to_string()];
        for title in titles {
            let value = result
                .outputs
                .iter()
                .find(|output| &output.title == title)
                .and_then(|output| output.output.as_ref())
                .map(|output| output.display_text())
                .unwrap_or_default();
            record.push(value);
        }
        record.push(String::new());
        rows.insert(result.row, record);
    }
    for failure in &progress.failures {
        let mut record = vec![(failure.row + 1).to_string(), "failed".to_string()];
        record.extend(titles.iter().map(|_| String::new()));
        record.push(failure.message.clone());
        rows.insert(failure.row, record);
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut header = vec!["row".to_string(), "status".to_string()];
    header.extend(titles.iter().cloned());
    header.push("error".to_string());
    writer.write_record(&header)?;
    for record in rows.values() {
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}
