// ==========================================
// 表格批量导入 - 导入组件 Trait
// ==========================================
// 职责: 定义导入管道各阶段接口（不包含实现）
// 流程: 结构描述 → 表头映射 → 值映射 → 预检 → 行转换 → 匹配 → 写入 → 报告
// ==========================================

use crate::domain::job::{FieldMapping, ImportJob, ValueMapping};
use crate::domain::record::{RawRow, RecordAttributes};
use crate::domain::report::ImportIssue;
use crate::domain::schema::RecordSchema;
use crate::importer::error::{ImportResult, RowError};
use std::collections::BTreeMap;

// ==========================================
// SchemaIntrospector Trait
// ==========================================
// 用途: 提供目标记录类型的字段描述（阶段 0）
// 实现者: StaticSchemaIntrospector, JsonSchemaIntrospector
pub trait SchemaIntrospector: Send + Sync {
    /// 返回目标记录结构
    ///
    /// # 返回
    /// - Ok(RecordSchema): 字段按描述顺序排列
    /// - Err: 描述文件读取/解析失败、字段重名
    fn introspect(&self) -> ImportResult<RecordSchema>;
}

// ==========================================
// HeaderMapper Trait
// ==========================================
// 用途: 源表头 → 结构字段的自动映射（阶段 1）
// 实现者: HeaderMapperImpl
pub trait HeaderMapper: Send + Sync {
    /// 推断字段映射
    ///
    /// # 规则
    /// 1. 规范化后精确匹配（先字段名，后显示名）
    /// 2. 余下表头按文件顺序做模糊匹配，相似度须严格大于阈值
    /// 3. 贪心，一对一
    fn map_headers(&self, headers: &[String], schema: &RecordSchema) -> FieldMapping;
}

// ==========================================
// ValueMapper Trait
// ==========================================
// 用途: 选项/引用字段的源值 → code / id 自动映射（阶段 1）
// 实现者: ValueMapperImpl

/// 值映射结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueMappingOutcome {
    pub mapping: ValueMapping,
    /// 字段名 → 无法映射的源值（文件顺序）
    pub unmapped: BTreeMap<String, Vec<String>>,
}

pub trait ValueMapper: Send + Sync {
    fn map_values(
        &self,
        schema: &RecordSchema,
        field_mapping: &FieldMapping,
        rows: &[RawRow],
    ) -> ValueMappingOutcome;
}

// ==========================================
// TypeValidator Trait
// ==========================================
// 用途: 行处理之前的一次性预检（阶段 2）
// 实现者: TypeValidatorImpl
pub trait TypeValidator: Send + Sync {
    /// 返回全部预检问题（致命 + 警告），由调用方决定是否中止
    fn validate(
        &self,
        schema: &RecordSchema,
        job: &ImportJob,
        headers: &[String],
        rows: &[RawRow],
    ) -> Vec<ImportIssue>;
}

// ==========================================
// RowTransformer Trait
// ==========================================
// 用途: 单行原始文本 → 强类型属性集（阶段 3）
// 实现者: RowTransformerImpl（每个任务构建一次，持有预加载的查找表）
pub trait RowTransformer {
    /// 转换一行
    ///
    /// # 返回
    /// - Ok(RecordAttributes): 仅包含已映射或有替代值的字段
    /// - Err(Vec<RowError>): 该行全部字段错误
    fn transform_row(&self, row: &RawRow) -> Result<RecordAttributes, Vec<RowError>>;
}
