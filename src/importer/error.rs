// ==========================================
// 表格批量导入 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================
// 分类:
// - SchemaError: 结构性错误，任何行处理前阻断整个任务
// - MappingAmbiguity: 值无法自动映射，作为警告返回（见 ImportIssue）
// - RowValidation / RowConflict: 行级错误，记录后跳过该行
// - SystemError: 意外失败，整体回滚
// ==========================================

use crate::domain::report::ImportIssue;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 结构性错误（致命）=====
    #[error("导入结构校验失败: {}", summarize_issues(.0))]
    Schema(Vec<ImportIssue>),

    #[error("导入任务参数无效: {0}")]
    InvalidJob(String),

    // ===== 系统错误（回滚）=====
    #[error("系统错误，已回滚: {0}")]
    System(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("CSV 处理失败: {0}")]
    CsvError(String),

    #[error("序列化失败: {0}")]
    SerializationError(String),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 是否为任务开始前的结构性错误
    pub fn is_schema_error(&self) -> bool {
        matches!(self, ImportError::Schema(_) | ImportError::InvalidJob(_))
    }
}

fn summarize_issues(issues: &[ImportIssue]) -> String {
    issues
        .iter()
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvError(err.to_string())
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::SerializationError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

// ==========================================
// RowError - 行级错误
// ==========================================
// 行级错误不会中断任务，只会让该行被排除在写入批次之外
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("{message}")]
    Conflict { message: String },
}

impl RowError {
    pub fn validation(field: &str, message: String) -> Self {
        RowError::Validation {
            field: field.to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::{IssueKind, IssueSeverity};

    #[test]
    fn test_schema_error_message_joins_issues() {
        let err = ImportError::Schema(vec![
            ImportIssue::fatal(IssueKind::RequiredUnmapped, "name", None, "缺少 A".to_string()),
            ImportIssue::fatal(IssueKind::UnknownField, "x", None, "缺少 B".to_string()),
        ]);

        assert!(err.is_schema_error());
        assert_eq!(err.to_string(), "导入结构校验失败: 缺少 A; 缺少 B");
        if let ImportError::Schema(issues) = &err {
            assert!(issues.iter().all(|i| i.severity == IssueSeverity::Fatal));
        }
    }

    #[test]
    fn test_row_error_display() {
        let err = RowError::validation("age", "Integer field 'Age': bad".to_string());
        assert_eq!(err.to_string(), "Integer field 'Age': bad");
        assert!(!ImportError::System("x".to_string()).is_schema_error());
    }
}
