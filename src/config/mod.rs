// ==========================================
// 表格批量导入 - 配置层
// ==========================================
// 职责: 导入阈值与目录配置，任务开始前读取为快照
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use import_config_trait::{ImportConfigReader, ImportSettings};
