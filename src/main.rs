// ==========================================
// 表格批量导入 - 命令行入口
// ==========================================

use anyhow::Context;
use clap::Parser;
use std::fs;
use std::process;
use tabular_import::api::ImportApi;
use tabular_import::cli::{AnalyzeArgs, Cli, Commands, HistoryArgs, RunArgs};
use tabular_import::domain::{ImportJobSpec, ImportStatus};
use tabular_import::importer::{JsonSchemaIntrospector, SchemaIntrospector};
use tabular_import::logging;
use tabular_import::repository::{ImportHistoryRepository, ImportHistoryRepositoryImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }
    tracing::info!(version = tabular_import::VERSION, "{}", tabular_import::APP_NAME);

    let result = match cli.command {
        Commands::Analyze(args) => analyze(args).await,
        Commands::Run(args) => run(args).await,
        Commands::History(args) => history(args),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            tracing::error!(error = %e, "命令执行失败");
            eprintln!("错误: {:#}", e);
            process::exit(1);
        }
    }
}

async fn analyze(args: AnalyzeArgs) -> anyhow::Result<i32> {
    let schema = JsonSchemaIntrospector::new(&args.schema).introspect()?;
    let api = ImportApi::new(&args.db, schema)?;

    let preview = api.analyze_file(&path_str(&args.file)).await?;
    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(0)
}

async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let schema = JsonSchemaIntrospector::new(&args.schema).introspect()?;
    let content = fs::read_to_string(&args.job)
        .with_context(|| format!("读取任务描述失败: {}", args.job.display()))?;
    let spec: ImportJobSpec = serde_json::from_str(&content)
        .with_context(|| format!("任务描述格式错误: {}", args.job.display()))?;

    let api = ImportApi::new(&args.db, schema)?;
    let response = api
        .import_file(&path_str(&args.file), spec, args.auto_map)
        .await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(match response.status {
        ImportStatus::Success => 0,
        ImportStatus::Partial => 2,
        ImportStatus::Failed => 1,
    })
}

fn history(args: HistoryArgs) -> anyhow::Result<i32> {
    let repo = ImportHistoryRepositoryImpl::new(&args.db)?;
    let records = repo.list_recent(args.limit.max(1))?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(0)
}

fn path_str(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}
