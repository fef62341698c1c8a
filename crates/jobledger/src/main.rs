use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use jobledger::config::{default_config_path, load_config};
use jobledger::orchestrator::{apply_batch, tailor_batch, JobOutcome, JobReport};
use jobledger::source::latest_csv;
use jobledger::{
    export, ingest_from_source, ArtifactLinker, BatchReport, CommandActuator, CommandRenderer,
    Config, CredentialVault, CsvJobSource, Database, JobLedgerError, JobStatus, JobStore,
    LedgerError, Orchestrator, StatusFilter,
};

/// Idempotent job-application ledger
#[derive(Parser, Debug)]
#[command(name = "jobledger", version)]
#[command(about = "Track, tailor and apply to job postings at most once each", long_about = None)]
struct Cli {
    /// Config file (default: ~/.jobledger/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest postings from a scraper CSV
    Ingest {
        /// CSV file (default: newest *_jobs.csv in the current directory)
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Only postings whose title or search query contains this
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long, default_value_t = 1000)]
        count: usize,
    },
    /// Render tailored resumes for discovered jobs
    Tailor {
        /// Specific job ids (default: discovered jobs)
        #[arg(long = "job")]
        jobs: Vec<String>,
        #[arg(long)]
        template: Option<String>,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Submit applications for tailored jobs (reconciles first)
    Apply {
        /// Specific job ids, tailored or failed (default: tailored jobs)
        #[arg(long = "job")]
        jobs: Vec<String>,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Reset applications interrupted by a crash to failed
    Reconcile,
    /// List jobs in ingest order
    List {
        #[arg(long)]
        status: Vec<JobStatus>,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Move a failed job back to discovered
    Retry { job_id: String },
    /// Abandon a failed job
    Skip { job_id: String },
    /// Write the job (and credential) tables as CSV
    Export {
        #[arg(long)]
        jobs: PathBuf,
        #[arg(long)]
        credentials: Option<PathBuf>,
    },
    /// Load credentials from a CSV with encoded passwords
    ImportCredentials { file: PathBuf },
}

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Success,
    JobFailures,
    Startup,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        match exit {
            Exit::Success => ExitCode::SUCCESS,
            Exit::JobFailures => ExitCode::from(1),
            Exit::Startup => ExitCode::from(2),
        }
    }
}

fn init_logging(verbose: bool) {
    tracing_log::LogTracer::init().ok();

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Shared handles opened once per invocation.
struct Ledger {
    config: Config,
    store: JobStore,
    vault: CredentialVault,
}

impl Ledger {
    fn open(config_path: Option<PathBuf>) -> Result<Self, JobLedgerError> {
        let config_path = config_path.or_else(default_config_path).ok_or_else(|| {
            JobLedgerError::Config(jobledger::ConfigError::Validation {
                message: "no home directory; pass --config".to_string(),
            })
        })?;
        let config = load_config(&config_path)?;

        let db_path = config.database_path().ok_or_else(|| {
            JobLedgerError::Config(jobledger::ConfigError::Validation {
                message: "no home directory; set database_path".to_string(),
            })
        })?;
        let db = Database::open(&db_path)?;
        let vault = CredentialVault::from_config(db.clone(), &config.vault)?;

        tracing::debug!(config = %config_path.display(), codec = vault.codec_name(), "Ledger opened");
        Ok(Self {
            store: JobStore::new(db),
            vault,
            config,
        })
    }

    fn orchestrator(&self) -> Orchestrator {
        let actuator = CommandActuator::new(
            self.config.actuator.program.clone(),
            self.config.actuator.args.clone(),
            self.config.actuator_timeout(),
        );
        Orchestrator::new(self.store.clone(), self.vault.clone(), Arc::new(actuator))
    }

    fn linker(&self) -> ArtifactLinker {
        let renderer = CommandRenderer::new(
            self.config.renderer.program.clone(),
            self.config.renderer.args.clone(),
        );
        ArtifactLinker::new(
            self.store.clone(),
            Arc::new(renderer),
            self.config.artifact_directory(),
        )
        .keep_superseded(self.config.keep_superseded_artifacts)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ledger = match Ledger::open(cli.config) {
        Ok(ledger) => ledger,
        Err(e) => {
            eprintln!("error: {}", e);
            return Exit::Startup.into();
        }
    };

    match run(&ledger, cli.command).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            eprintln!("error: {}", e);
            Exit::JobFailures.into()
        }
    }
}

async fn run(ledger: &Ledger, command: Command) -> Result<Exit, JobLedgerError> {
    match command {
        Command::Ingest { csv, query, count } => {
            let path = match csv {
                Some(path) => path,
                None => latest_csv(&std::env::current_dir().map_err(|e| {
                    jobledger::SourceError::NoSource(format!("current directory: {}", e))
                })?)?,
            };
            let source = CsvJobSource::new(&path, ledger.config.platform.clone());
            let report = ingest_from_source(&ledger.store, &source, &query, count).await?;

            for (index, reason) in &report.rejected {
                println!("rejected record {}: {}", index, reason);
            }
            println!(
                "{}: {} fetched, {} new, {} rejected",
                path.display(),
                report.fetched,
                report.inserted,
                report.rejected.len()
            );
            Ok(exit_for(report.rejected.is_empty()))
        }

        Command::Tailor {
            jobs,
            template,
            limit,
        } => {
            let template = ledger.config.template(template.as_deref()).ok_or_else(|| {
                LedgerError::Validation(format!(
                    "unknown template '{}'",
                    template.as_deref().unwrap_or("<default>")
                ))
            })?;

            let mut report = BatchReport::default();
            let targets = if jobs.is_empty() {
                ledger
                    .store
                    .list(&StatusFilter::only(&[JobStatus::Discovered]).with_limit(limit))?
            } else {
                let mut found = Vec::new();
                for job_id in jobs {
                    match ledger.store.get(&job_id) {
                        Ok(job) => found.push(job),
                        Err(e) => report.jobs.push(JobReport {
                            job_id,
                            outcome: JobOutcome::Error(e.to_string()),
                        }),
                    }
                }
                found
            };

            let linker = ledger.linker();
            let batch = tailor_batch(&linker, targets, &template, ledger.config.concurrency).await;
            report.jobs.extend(batch.jobs);
            Ok(print_report(&report))
        }

        Command::Apply { jobs, limit } => {
            let orchestrator = ledger.orchestrator();
            let reconciled = orchestrator.reconcile().await?;
            if !reconciled.reset.is_empty() {
                println!("reset {} interrupted application(s)", reconciled.reset.len());
            }

            let job_ids = if jobs.is_empty() {
                ledger
                    .store
                    .list(&StatusFilter::only(&[JobStatus::Tailored]).with_limit(limit))?
                    .into_iter()
                    .map(|job| job.job_id)
                    .collect()
            } else {
                jobs
            };

            let report = apply_batch(&orchestrator, job_ids, ledger.config.concurrency).await;
            Ok(print_report(&report))
        }

        Command::Reconcile => {
            let report = ledger.orchestrator().reconcile().await?;
            for job_id in &report.reset {
                println!("{}  failed    interrupted", job_id);
            }
            println!("reset {} interrupted application(s)", report.reset.len());
            Ok(Exit::Success)
        }

        Command::List { status, limit } => {
            let jobs = ledger
                .store
                .list(&StatusFilter::only(&status).with_limit(limit))?;
            for job in &jobs {
                let reason = job.failure_reason.as_deref().unwrap_or_default();
                println!(
                    "{}  {:<10}  {} @ {}  {}",
                    job.job_id, job.status, job.title, job.company, reason
                );
            }
            let summary: Vec<String> = ledger
                .store
                .count_by_status()?
                .into_iter()
                .map(|(status, count)| format!("{} {}", count, status))
                .collect();
            println!("{} job(s) listed; ledger: {}", jobs.len(), summary.join(", "));
            Ok(Exit::Success)
        }

        Command::Retry { job_id } => {
            let job = ledger
                .store
                .update_status(&job_id, JobStatus::Discovered, None)?;
            println!("{}  {}", job.job_id, job.status);
            Ok(Exit::Success)
        }

        Command::Skip { job_id } => {
            let job = ledger
                .store
                .update_status(&job_id, JobStatus::Skipped, None)?;
            println!("{}  {}", job.job_id, job.status);
            Ok(Exit::Success)
        }

        Command::Export { jobs, credentials } => {
            let count = export::export_jobs(&ledger.store, &jobs)?;
            println!("{} job(s) written to {}", count, jobs.display());
            if let Some(path) = credentials {
                let count = export::export_credentials(&ledger.vault, &path)?;
                println!("{} credential(s) written to {}", count, path.display());
            }
            Ok(Exit::Success)
        }

        Command::ImportCredentials { file } => {
            let count = export::import_credentials(&ledger.vault, &file)?;
            println!("{} credential(s) imported from {}", count, file.display());
            Ok(Exit::Success)
        }
    }
}

fn exit_for(success: bool) -> Exit {
    if success {
        Exit::Success
    } else {
        Exit::JobFailures
    }
}

fn print_report(report: &BatchReport) -> Exit {
    for job in &report.jobs {
        println!("{}", job);
    }
    exit_for(!report.has_failures())
}
