// ==========================================
// 表格批量导入 - 记录值模型
// ==========================================
// 职责: 单元格强类型值 / 行属性集 / 匹配键 / 已存在记录
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// 引用目标 ID
pub type ReferenceId = i64;

// ==========================================
// FieldValue - 强类型字段值
// ==========================================
// Choice / Email / Url 以 Text 表示（Choice 存 code）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Reference(ReferenceId),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// 匹配键规范化表示（Null 无法参与匹配）
    pub fn key_repr(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Integer(n) => Some(n.to_string()),
            FieldValue::Decimal(d) => Some(d.to_string()),
            FieldValue::Boolean(b) => Some(b.to_string()),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::DateTime(dt) => Some(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            FieldValue::Reference(id) => Some(id.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key_repr() {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "N/A"),
        }
    }
}

/// 源文件原始行（表头 → 单元格文本）
pub type RawRow = HashMap<String, String>;

/// 行属性集（字段名 → 值）
pub type RecordAttributes = BTreeMap<String, FieldValue>;

// ==========================================
// MatchKey - 匹配键
// ==========================================
// 按 match_fields 顺序排列的规范化值元组
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MatchKey(pub Vec<String>);

impl MatchKey {
    /// 从属性集构造；任一匹配字段为空时返回 None
    pub fn from_attributes(attributes: &RecordAttributes, match_fields: &[String]) -> Option<Self> {
        if match_fields.is_empty() {
            return None;
        }
        match_fields
            .iter()
            .map(|f| attributes.get(f).and_then(FieldValue::key_repr))
            .collect::<Option<Vec<_>>>()
            .map(MatchKey)
    }

    /// 用于错误提示: field='value', ...
    pub fn describe(attributes: &RecordAttributes, match_fields: &[String]) -> String {
        match_fields
            .iter()
            .map(|f| {
                let value = attributes.get(f).cloned().unwrap_or(FieldValue::Null);
                format!("{}='{}'", f, value)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ==========================================
// SystemStamp - 系统字段戳
// ==========================================
// 每次写入都会刷新 updated_at / updated_by / tenant_id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStamp {
    pub at: NaiveDateTime,
    pub actor: Option<String>,
    pub tenant: Option<String>,
}

/// 系统字段名（更新时总是写入）
pub const SYSTEM_UPDATE_FIELDS: [&str; 3] = ["updated_at", "updated_by", "tenant_id"];

// ==========================================
// StoredRecord - 已落库记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    pub attributes: RecordAttributes,
}
