// ==========================================
// 表格批量导入 - 记录存储 Trait
// ==========================================
// 职责: 定义目标记录的查询/批量写入/事务接口（不包含业务逻辑）
// 红线: Repository 不含映射与校验规则，只做数据读写
// ==========================================

use crate::domain::record::{FieldValue, RecordAttributes, StoredRecord, SystemStamp};
use crate::domain::schema::RecordSchema;
use crate::repository::error::RepositoryResult;
use serde::Serialize;

// ==========================================
// BatchCapabilities - 后端批量能力
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchCapabilities {
    pub create_batch_size: usize,
    pub update_batch_size: usize,
    pub max_params: usize, // 单条语句可绑定参数上限
}

impl BatchCapabilities {
    pub const fn sqlite() -> Self {
        Self {
            create_batch_size: 500,
            update_batch_size: 100,
            max_params: 900,
        }
    }

    pub const fn postgres() -> Self {
        Self {
            create_batch_size: 1000,
            update_batch_size: 500,
            max_params: 32_767,
        }
    }

    pub const fn generic() -> Self {
        Self {
            create_batch_size: 999,
            update_batch_size: 200,
            max_params: 999,
        }
    }
}

// ==========================================
// RecordStore Trait
// ==========================================
// 用途: 导入管道的唯一写入口
// 实现者: SqliteRecordStore（使用 rusqlite）
pub trait RecordStore: Send + Sync {
    /// 后端批量能力
    fn capabilities(&self) -> BatchCapabilities;

    /// 确保目标表存在
    fn ensure_table(&self, schema: &RecordSchema) -> RepositoryResult<()>;

    // ===== 事务控制 =====

    fn begin(&self) -> RepositoryResult<()>;

    fn commit(&self) -> RepositoryResult<()>;

    fn rollback(&self) -> RepositoryResult<()>;

    // ===== 查询 =====

    /// 按匹配字段取值元组查询已存在记录
    ///
    /// # 参数
    /// - match_fields: 匹配字段（顺序与元组一致）
    /// - key_values: 去重后的取值元组，调用方负责按 max_params 分块
    ///
    /// # 返回
    /// - 命中的记录（按 id 升序）
    fn find_by_match_fields(
        &self,
        schema: &RecordSchema,
        match_fields: &[String],
        key_values: &[Vec<FieldValue>],
    ) -> RepositoryResult<Vec<StoredRecord>>;

    // ===== 批量写入 =====

    /// 批量新增，返回新记录 id（与输入顺序一致）
    fn bulk_create(
        &self,
        schema: &RecordSchema,
        records: &[RecordAttributes],
        stamp: &SystemStamp,
    ) -> RepositoryResult<Vec<i64>>;

    /// 批量更新同一组字段
    ///
    /// # 参数
    /// - fields: 本组变更的业务字段（系统字段由实现方追加）
    /// - updates: (记录 id, 新属性集)
    fn bulk_update(
        &self,
        schema: &RecordSchema,
        fields: &[String],
        updates: &[(i64, RecordAttributes)],
        stamp: &SystemStamp,
    ) -> RepositoryResult<usize>;
}
