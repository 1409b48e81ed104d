// ==========================================
// 表格批量导入 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 定位: 表头/取值自动映射 + 类型预检 + 事务化增改 + 行级错误报告
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 结构描述 / 任务 / 记录 / 报告
pub mod domain;

// 数据仓储层 - 目标记录与导入历史
pub mod repository;

// 导入层 - 映射 / 校验 / 写入管道
pub mod importer;

// 配置层 - 导入阈值
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 导入门面
pub mod api;

// 命令行参数
pub mod cli;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::{
    FieldKind, FieldValue, ImportJob, ImportPolicy, ImportReport, ImportSummary, RecordSchema,
    RowOutcome, RowResult, SchemaField,
};

pub use importer::{ImportError, ImportPipeline, ImportResult};

pub use api::{ApiError, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "表格批量导入";
