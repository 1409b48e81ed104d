// ==========================================
// 表格批量导入 - 领域模型层
// ==========================================
// 职责: 定义记录结构描述、导入任务、记录值与报告类型
// 红线: 不含数据访问逻辑，不含映射/校验逻辑
// ==========================================

pub mod job;
pub mod record;
pub mod report;
pub mod schema;

// 重导出核心类型
pub use job::{
    DateOrder, FieldMapping, ImportJob, ImportJobBuilder, ImportJobSpec, ImportPolicy,
    ReplaceValues, ValueMapping,
};
pub use record::{
    FieldValue, MatchKey, RawRow, RecordAttributes, ReferenceId, StoredRecord, SystemStamp,
    SYSTEM_UPDATE_FIELDS,
};
pub use report::{
    DetailedError, ImportHistoryRecord, ImportIssue, ImportReport, ImportStatus, ImportSummary,
    IssueKind, IssueSeverity, MappingPreview, RowOutcome, RowResult,
};
pub use schema::{ChoiceOption, FieldKind, RecordSchema, ReferenceTarget, SchemaField};
