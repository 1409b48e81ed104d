// ==========================================
// 表格批量导入 - API 层
// ==========================================
// 职责: 提供导入门面，供 CLI 或上层服务调用
// ==========================================

pub mod error;
pub mod import_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_api::{ImportApi, ImportFileResponse};
