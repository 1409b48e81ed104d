// ==========================================
// 表格批量导入 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口，屏蔽数据库细节
// 约束: 所有取值使用参数化，标识符先校验后引用
// ==========================================

pub mod error;
pub mod import_history_repo;
pub mod record_store;
pub mod record_store_impl;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use import_history_repo::{ImportHistoryRepository, ImportHistoryRepositoryImpl};
pub use record_store::{BatchCapabilities, RecordStore};
pub use record_store_impl::SqliteRecordStore;
