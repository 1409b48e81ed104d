// ==========================================
// 表格批量导入 - 命令行参数
// ==========================================
// 子命令: analyze / run / history，结果以 JSON 输出到 stdout
// ==========================================

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// 表格批量导入工具
#[derive(Parser, Debug)]
#[command(name = "tabular-import")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// 以 JSON 行格式输出日志
    #[arg(long, global = true, env = "TABULAR_IMPORT_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 自动推断映射并预检，不写库
    Analyze(AnalyzeArgs),

    /// 执行导入
    Run(RunArgs),

    /// 查看最近的导入历史
    History(HistoryArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// 数据库文件（读取配置）
    #[arg(long, default_value = ":memory:", env = "TABULAR_IMPORT_DB")]
    pub db: String,

    /// 结构描述 JSON 文件
    #[arg(long)]
    pub schema: PathBuf,

    /// 源 CSV 文件
    #[arg(long)]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(long, env = "TABULAR_IMPORT_DB")]
    pub db: String,

    #[arg(long)]
    pub schema: PathBuf,

    #[arg(long)]
    pub file: PathBuf,

    /// 任务描述 JSON 文件
    #[arg(long)]
    pub job: PathBuf,

    /// 用自动推断补全字段映射
    #[arg(long)]
    pub auto_map: bool,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[arg(long, env = "TABULAR_IMPORT_DB")]
    pub db: String,

    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}
