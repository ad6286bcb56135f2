//! logrelay CLI - run combat log background tasks from the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use logrelay_core::{is_gzip_path, ExternalToolRequest, ExternalToolSettings, MetricsInput, RuntimePreference};
use logrelay_external::{default_data_root, ExternalToolRunner};
use logrelay_upload::{DetailFetchConfig, DetailFetcher, DetailOutcome, ReportClient, UploadQueue, UploadQueueConfig};
use logrelay_worker::{ToolWorker, ToolWorkerConfig, WorkerPool, WorkerPoolConfig};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// logrelay - combat log processing and upload
#[derive(Parser)]
#[command(name = "logrelay")]
#[command(about = "Hash, parse, analyze and upload combat logs", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Data directory for the external tool install and caches
    #[arg(long, global = true, env = "LOGRELAY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Maximum pool workers (defaults to cores - 1)
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum RuntimeChoice {
    Auto,
    Managed,
    Compat,
}

impl From<RuntimeChoice> for RuntimePreference {
    fn from(choice: RuntimeChoice) -> Self {
        match choice {
            RuntimeChoice::Auto => Self::Auto,
            RuntimeChoice::Managed => Self::Managed,
            RuntimeChoice::Compat => Self::Compat,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SHA-256 digest of each file
    Hash {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Decode a JSON report (gzip detected from the extension)
    Parse {
        file: PathBuf,

        /// Treat the file as gzip-compressed regardless of its name
        #[arg(long)]
        gzip: bool,
    },

    /// Compute condition metrics from a JSON report
    Metrics { report: PathBuf },

    /// Upload logs to the analysis service
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// User token sent with each upload
        #[arg(long, env = "LOGRELAY_TOKEN")]
        token: Option<String>,

        /// Concurrent uploads
        #[arg(long, default_value = "3")]
        concurrency: usize,

        /// Also fetch the detailed report for each successful upload
        #[arg(long)]
        detail: bool,
    },

    /// Fetch detailed reports for uploaded logs
    #[command(name = "fetch-detail")]
    FetchDetail {
        #[arg(required = true)]
        permalinks: Vec<String>,
    },

    /// Run the external analysis tool on a log
    Analyze {
        log: PathBuf,

        #[arg(long, value_enum, default_value = "auto")]
        runtime: RuntimeChoice,

        /// Do not install the tool or a launcher when missing
        #[arg(long)]
        no_auto_setup: bool,

        /// Skip the periodic release check
        #[arg(long)]
        no_auto_update: bool,

        /// Token written into the tool configuration
        #[arg(long, env = "LOGRELAY_TOKEN")]
        token: Option<String>,
    },

    /// Install or update the external analysis tool
    #[command(name = "update-tool")]
    UpdateTool,
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_root);
    let mut pool_config = WorkerPoolConfig::default();
    if let Some(max) = cli.workers {
        pool_config.max_workers = max;
    }

    match cli.command {
        Commands::Hash { files } => {
            let pool = WorkerPool::init(pool_config).await?;
            hash(&pool, files).await?;
            pool.shutdown().await;
        }
        Commands::Parse { file, gzip } => {
            let pool = WorkerPool::init(pool_config).await?;
            let doc = pool.parse_document(&file, gzip || is_gzip_path(&file)).await?;
            print_json(&doc)?;
            pool.shutdown().await;
        }
        Commands::Metrics { report } => {
            let pool = WorkerPool::init(pool_config).await?;
            metrics(&pool, &report).await?;
            pool.shutdown().await;
        }
        Commands::Upload {
            files,
            token,
            concurrency,
            detail,
        } => {
            upload(files, token, concurrency, detail).await?;
        }
        Commands::FetchDetail { permalinks } => {
            let fetcher = detail_fetcher();
            for permalink in permalinks {
                print_detail(&fetcher.fetch_detail(&permalink).await)?;
            }
        }
        Commands::Analyze {
            log,
            runtime,
            no_auto_setup,
            no_auto_update,
            token,
        } => {
            let settings = ExternalToolSettings {
                enabled: true,
                auto_setup: !no_auto_setup,
                auto_update: !no_auto_update,
                preferred_runtime: runtime.into(),
            };
            let pool = WorkerPool::init(pool_config).await?;
            analyze(&pool, &data_dir, log, settings, token).await?;
            pool.shutdown().await;
        }
        Commands::UpdateTool => {
            let runner = ExternalToolRunner::new(&data_dir);
            let settings = ExternalToolSettings::default().enabled();
            let status = runner.update_if_needed(&settings).await;
            print_json(&serde_json::json!({
                "updated": status.updated,
                "version": status.version,
                "error": status.error,
            }))?;
        }
    }

    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn detail_fetcher() -> DetailFetcher {
    DetailFetcher::new(Arc::new(ReportClient::new()), DetailFetchConfig::default())
}

fn print_detail(outcome: &DetailOutcome) -> CliResult {
    match outcome {
        DetailOutcome::Found(doc) => print_json(doc.as_ref()),
        DetailOutcome::Failed(failure) => print_json(failure),
    }
}

async fn hash(pool: &WorkerPool, files: Vec<PathBuf>) -> CliResult {
    let mut jobs = JoinSet::new();
    for (index, file) in files.into_iter().enumerate() {
        let pool = pool.clone();
        jobs.spawn(async move {
            let digest = pool.hash(&file).await;
            (index, file, digest)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = jobs.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(index, _, _)| *index);

    for (_, file, digest) in results {
        match digest {
            Ok(digest) => println!("{}  {}", digest, file.display()),
            Err(e) => warn!(file = %file.display(), error = %e, "Hash failed"),
        }
    }
    Ok(())
}

async fn metrics(pool: &WorkerPool, report: &Path) -> CliResult {
    let doc = pool.parse_document(report, is_gzip_path(report)).await?;
    let input: MetricsInput = serde_json::from_value(doc)?;
    let result = pool.compute_metrics(&input).await?;
    print_json(&result)
}

async fn upload(files: Vec<PathBuf>, token: Option<String>, concurrency: usize, detail: bool) -> CliResult {
    let config = UploadQueueConfig {
        concurrency,
        auth_token: token,
        ..UploadQueueConfig::default()
    };
    let queue = UploadQueue::new(Arc::new(ReportClient::new()), config);
    let fetcher = Arc::new(detail_fetcher());

    let mut uploads = JoinSet::new();
    for file in files {
        let queue = queue.clone();
        let fetcher = fetcher.clone();
        uploads.spawn(async move {
            let result = queue.upload(&file).await;
            let detail = if detail && result.is_success() {
                Some(fetcher.fetch_detail(&result.permalink).await)
            } else {
                None
            };
            (file, result, detail)
        });
    }

    while let Some(joined) = uploads.join_next().await {
        let (file, result, detail) = joined?;
        if result.is_success() {
            info!(file = %file.display(), permalink = %result.permalink, "Uploaded");
        } else {
            warn!(file = %file.display(), error = ?result.error, "Upload failed");
        }
        print_json(&result)?;
        if let Some(outcome) = detail {
            print_detail(&outcome)?;
        }
    }
    Ok(())
}

async fn analyze(
    pool: &WorkerPool,
    data_dir: &Path,
    log: PathBuf,
    settings: ExternalToolSettings,
    token: Option<String>,
) -> CliResult {
    let runner = ExternalToolRunner::new(data_dir).with_reader(Arc::new(pool.clone()));
    let worker = ToolWorker::init(Arc::new(runner), ToolWorkerConfig::default()).await?;

    let cache_key = pool.hash(&log).await?;
    let mut request = ExternalToolRequest::new(&log, settings).with_cache_key(cache_key);
    if let Some(token) = token {
        request = request.with_auth_token(token);
    }

    let result = worker.run_external_tool(request).await;
    worker.shutdown().await;
    print_json(&result?)
}
