// ==========================================
// 表格批量导入 - 结果与报告模型
// ==========================================
// 职责: 行结果 / 汇总统计 / 预检问题 / 映射预览 / 导入历史
// 红线: 汇总计数只来自对 RowResult 的一次线性归约
// ==========================================

use crate::domain::job::{FieldMapping, ImportPolicy, ValueMapping};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ==========================================
// RowOutcome - 行处理结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    Created,
    Updated,
    SkippedExisting, // 仅新增模式下记录已存在（计为错误）
    SkippedMissing,  // 仅更新模式下记录不存在（计为错误）
    Failed,          // 字段级校验失败
}

impl RowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RowOutcome::Created | RowOutcome::Updated)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowResult {
    pub row_number: usize, // 1 起，不含表头
    pub outcome: RowOutcome,
    pub errors: Vec<String>,
}

impl RowResult {
    /// 汇总展示用: "Row {n}: e1; e2"
    pub fn error_line(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(format!("Row {}: {}", self.row_number, self.errors.join("; ")))
        }
    }
}

// ==========================================
// ImportStatus - 任务状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Success,
    Partial,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Success => "success",
            ImportStatus::Partial => "partial",
            ImportStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "success" => ImportStatus::Success,
            "partial" => ImportStatus::Partial,
            _ => ImportStatus::Failed,
        }
    }
}

// ==========================================
// ImportSummary - 汇总统计
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub error_count: usize,
    pub successful_rows: usize,
    pub success_rate: f64,           // 百分比，保留 1 位小数
    pub errors: Vec<String>,         // 前 N 条错误（默认 5）
    pub has_more_errors: bool,
    pub error_report_path: Option<String>,
    pub status: ImportStatus,
}

impl ImportSummary {
    /// 对行结果做一次线性归约
    pub fn from_results(results: &[RowResult], error_limit: usize) -> Self {
        let mut created_count = 0;
        let mut updated_count = 0;
        let mut error_count = 0;
        let mut errors = Vec::new();
        let mut total_error_lines = 0;

        for result in results {
            match result.outcome {
                RowOutcome::Created => created_count += 1,
                RowOutcome::Updated => updated_count += 1,
                _ => error_count += 1,
            }
            if let Some(line) = result.error_line() {
                total_error_lines += 1;
                if errors.len() < error_limit {
                    errors.push(line);
                }
            }
        }

        let total_rows = results.len();
        let successful_rows = created_count + updated_count;

        Self {
            total_rows,
            created_count,
            updated_count,
            error_count,
            successful_rows,
            success_rate: success_rate(successful_rows, total_rows),
            errors,
            has_more_errors: total_error_lines > error_limit,
            error_report_path: None,
            status: derive_status(error_count, successful_rows),
        }
    }

    /// 任务级失败（结构错误/系统错误）时的汇总
    pub fn failed(total_rows: usize, message: String) -> Self {
        Self {
            total_rows,
            created_count: 0,
            updated_count: 0,
            error_count: total_rows,
            successful_rows: 0,
            success_rate: 0.0,
            errors: vec![message],
            has_more_errors: false,
            error_report_path: None,
            status: ImportStatus::Failed,
        }
    }
}

fn success_rate(successful: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = successful as f64 / total as f64 * 100.0;
    (rate * 10.0).round() / 10.0
}

fn derive_status(error_count: usize, successful_rows: usize) -> ImportStatus {
    if error_count == 0 {
        ImportStatus::Success
    } else if successful_rows > 0 {
        ImportStatus::Partial
    } else {
        ImportStatus::Failed
    }
}

// ==========================================
// ImportIssue - 预检问题
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Fatal,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    RequiredUnmapped,
    UnknownField,
    UnknownHeader,
    DuplicateHeader,
    UnknownMatchField,
    InvalidMappingTarget,
    InvalidReplaceValue,
    TypeMismatch,
    LikelyMistyped,
    UnmappedValues,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportIssue {
    pub field: String,
    pub header: Option<String>,
    pub severity: IssueSeverity,
    pub kind: IssueKind,
    pub message: String,
}

impl ImportIssue {
    pub fn fatal(kind: IssueKind, field: &str, header: Option<&str>, message: String) -> Self {
        Self {
            field: field.to_string(),
            header: header.map(str::to_string),
            severity: IssueSeverity::Fatal,
            kind,
            message,
        }
    }

    pub fn warning(kind: IssueKind, field: &str, header: Option<&str>, message: String) -> Self {
        Self {
            field: field.to_string(),
            header: header.map(str::to_string),
            severity: IssueSeverity::Warning,
            kind,
            message,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == IssueSeverity::Fatal
    }
}

// ==========================================
// MappingPreview - 映射预览（分析阶段输出）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingPreview {
    pub headers: Vec<String>,
    pub field_mapping: FieldMapping,
    pub unmapped_headers: Vec<String>,
    pub value_mapping: ValueMapping,
    pub unmapped_values: BTreeMap<String, Vec<String>>,
    pub issues: Vec<ImportIssue>,
    pub sample_rows: Vec<HashMap<String, String>>,
}

// ==========================================
// DetailedError - 错误文件行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedError {
    pub row_number: usize,
    pub errors: String, // "; " 拼接
}

// ==========================================
// ImportReport - 单次任务完整结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub job_id: String,
    pub summary: ImportSummary,
    pub row_results: Vec<RowResult>,
    pub warnings: Vec<ImportIssue>,
    pub detailed_errors: Vec<DetailedError>,
}

// ==========================================
// ImportHistoryRecord - 导入历史
// ==========================================
// 对齐: import_history 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportHistoryRecord {
    pub history_id: String,
    pub import_name: String,
    pub record_type: String,
    pub source_name: Option<String>,
    pub policy: ImportPolicy,
    pub match_fields: Vec<String>,
    pub field_mapping: FieldMapping,
    pub status: ImportStatus,
    pub total_rows: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub error_count: usize,
    pub success_rate: f64,
    pub error_report_path: Option<String>,
    pub error_summary: Vec<String>, // 截断为前 5 条
    pub duration_ms: u64,
    pub actor: Option<String>,
    pub tenant: Option<String>,
    pub created_at: DateTime<Utc>,
}
