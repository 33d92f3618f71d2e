use anyhow::{Context, Result};
use clap::Parser;
use sql_execution_agent::{
    init_tracing, BigQueryClient, BigQueryConfig, ExecutionLogger, ExecutorConfig, LlmRepairClient,
    LlmRepairConfig, NoopRepair, QueryExecutor, QueryMetadata, RepairClient,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sql-exec")]
#[command(about = "Run a read-only SQL query against BigQuery with safety checks and repair")]
struct Args {
    /// The SQL query to run
    #[arg(required_unless_present = "history")]
    query: Option<String>,

    /// GCP project (or set GCP_PROJECT_ID)
    #[arg(short, long)]
    project: Option<String>,

    /// Only validate and estimate cost
    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    max_results: Option<usize>,

    #[arg(long)]
    timeout_seconds: Option<u64>,

    /// Business domain tag recorded in logs
    #[arg(long, default_value = "ADHOC")]
    domain: String,

    /// Intent tag recorded in logs
    #[arg(long, default_value = "cli")]
    intent: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Append an audit record per execution to this JSON-lines file
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Print the N most recent warehouse jobs instead of running a query
    #[arg(long, value_name = "N")]
    history: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = ExecutorConfig::from_env().context("invalid executor configuration")?;

    let warehouse_config = BigQueryConfig::from_env_with_project(args.project.clone())
        .context("invalid BigQuery configuration")?;
    let project_id = warehouse_config.project_id.clone();
    let warehouse = Arc::new(BigQueryClient::new(warehouse_config)?);

    let repair: Arc<dyn RepairClient> = match LlmRepairConfig::from_env() {
        Ok(llm_config) => Arc::new(LlmRepairClient::new(llm_config)?),
        Err(_) => {
            warn!("OPENAI_API_KEY not set, query repair is disabled");
            Arc::new(NoopRepair)
        }
    };

    let mut executor = QueryExecutor::new(warehouse, repair, config);
    if let Some(path) = args.audit_log.clone() {
        executor = executor.with_logger(Arc::new(ExecutionLogger::new(Some(path), 1000)));
    }

    if let Some(limit) = args.history {
        let jobs = executor.query_history(limit).await?;
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    let query = args.query.unwrap_or_default();
    let mut request = executor
        .request(query, project_id, QueryMetadata::new(args.domain, args.intent))
        .with_dry_run(args.dry_run);
    if let Some(max_results) = args.max_results {
        request = request.with_max_results(max_results);
    }
    if let Some(timeout_seconds) = args.timeout_seconds {
        request = request.with_timeout_seconds(timeout_seconds);
    }

    let response = executor.execute(&request).await;
    info!("Query finished with status {}", response.status);
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
