// ==========================================
// 表格批量导入 - 目标记录结构描述
// ==========================================
// 职责: 描述目标记录类型的字段（名称/显示名/类型/必填/选项/引用目标）
// 红线: 管道只读取静态描述，不做任何运行时反射
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// FieldKind - 字段类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Email,
    Url,
    Choice,
    Reference,
}

impl FieldKind {
    /// 用于提示信息的类型名
    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Text => "TEXT",
            FieldKind::Integer => "INTEGER",
            FieldKind::Decimal => "DECIMAL",
            FieldKind::Boolean => "BOOLEAN",
            FieldKind::Date => "DATE",
            FieldKind::DateTime => "DATETIME",
            FieldKind::Email => "EMAIL",
            FieldKind::Url => "URL",
            FieldKind::Choice => "CHOICE",
            FieldKind::Reference => "REFERENCE",
        }
    }

    /// SQLite 列类型
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::Integer | FieldKind::Boolean | FieldKind::Reference => "INTEGER",
            FieldKind::Decimal => "REAL",
            _ => "TEXT",
        }
    }

    /// 是否需要值映射（选项/引用）
    pub fn is_lookup(&self) -> bool {
        matches!(self, FieldKind::Choice | FieldKind::Reference)
    }
}

/// 选项（code/label）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub code: String,
    pub label: String,
}

/// 引用目标（id/显示名）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTarget {
    pub id: i64,
    pub label: String,
}

// ==========================================
// SchemaField - 字段描述
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub verbose_name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub choices: Vec<ChoiceOption>,
    #[serde(default)]
    pub reference_targets: Vec<ReferenceTarget>,
}

impl SchemaField {
    pub fn new(name: &str, verbose_name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            verbose_name: verbose_name.to_string(),
            kind,
            required: false,
            choices: Vec::new(),
            reference_targets: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_choices(mut self, choices: &[(&str, &str)]) -> Self {
        self.choices = choices
            .iter()
            .map(|(code, label)| ChoiceOption {
                code: code.to_string(),
                label: label.to_string(),
            })
            .collect();
        self
    }

    pub fn with_references(mut self, targets: &[(i64, &str)]) -> Self {
        self.reference_targets = targets
            .iter()
            .map(|(id, label)| ReferenceTarget {
                id: *id,
                label: label.to_string(),
            })
            .collect();
        self
    }

    pub fn has_choice_code(&self, code: &str) -> bool {
        self.choices.iter().any(|c| c.code == code)
    }

    pub fn has_reference_id(&self, id: i64) -> bool {
        self.reference_targets.iter().any(|t| t.id == id)
    }
}

// ==========================================
// RecordSchema - 目标记录类型
// ==========================================
// 字段顺序即描述顺序，映射平局与行内字段遍历都依赖此顺序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub record_type: String,
    pub fields: Vec<SchemaField>,
}

impl RecordSchema {
    pub fn new(record_type: &str, fields: Vec<SchemaField>) -> Self {
        Self {
            record_type: record_type.to_string(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}
