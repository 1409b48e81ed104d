// ==========================================
// 表格批量导入 - 导入任务模型
// ==========================================
// 职责: 导入策略 / 映射表 / 任务选项
// 红线: ImportJob 构建一次、消费一次，不做持久化
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 字段名 → 源表头
pub type FieldMapping = BTreeMap<String, String>;

/// 字段名 → {源值 slug → 选项 code / 引用 id}
pub type ValueMapping = BTreeMap<String, BTreeMap<String, String>>;

/// 字段名 → 空值替代
pub type ReplaceValues = BTreeMap<String, String>;

// ==========================================
// ImportPolicy - 导入策略
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImportPolicy {
    #[default]
    CreateOnly,
    UpdateOnly,
    Upsert,
}

impl ImportPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportPolicy::CreateOnly => "create_only",
            ImportPolicy::UpdateOnly => "update_only",
            ImportPolicy::Upsert => "upsert",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "create_only" | "create" => Some(ImportPolicy::CreateOnly),
            "update_only" | "update" => Some(ImportPolicy::UpdateOnly),
            "upsert" | "create_update" => Some(ImportPolicy::Upsert),
            _ => None,
        }
    }

    /// 是否需要匹配字段
    pub fn needs_match_fields(&self) -> bool {
        !matches!(self, ImportPolicy::CreateOnly)
    }
}

// ==========================================
// DateOrder - 斜杠日期优先顺序
// ==========================================
// ISO-8601 永远优先，之后按此顺序尝试 m/d/Y 与 d/m/Y
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    #[default]
    MonthFirst,
    DayFirst,
}

// ==========================================
// ImportJob - 导入任务
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportJob {
    pub job_id: String,
    pub import_name: String,
    pub source_name: Option<String>,
    pub policy: ImportPolicy,
    pub match_fields: Vec<String>,
    pub field_mapping: FieldMapping,
    pub value_mapping: ValueMapping,
    pub replace_values: ReplaceValues,
    pub date_order: DateOrder,
    pub strict_type_validation: bool,
    pub actor: Option<String>,
    pub tenant: Option<String>,
}

impl ImportJob {
    pub fn builder(policy: ImportPolicy) -> ImportJobBuilder {
        ImportJobBuilder::new(policy)
    }

    /// 字段对应的表头（未映射返回 None）
    pub fn header_for(&self, field: &str) -> Option<&str> {
        self.field_mapping.get(field).map(String::as_str)
    }

    /// 字段是否会在每行得到一个值（映射或替代）
    pub fn covers(&self, field: &str) -> bool {
        self.field_mapping.contains_key(field) || self.replace_values.contains_key(field)
    }
}

// ==========================================
// ImportJobBuilder
// ==========================================
#[derive(Debug, Clone)]
pub struct ImportJobBuilder {
    job: ImportJob,
}

impl ImportJobBuilder {
    fn new(policy: ImportPolicy) -> Self {
        Self {
            job: ImportJob {
                job_id: uuid::Uuid::new_v4().to_string(),
                import_name: String::new(),
                source_name: None,
                policy,
                match_fields: Vec::new(),
                field_mapping: FieldMapping::new(),
                value_mapping: ValueMapping::new(),
                replace_values: ReplaceValues::new(),
                date_order: DateOrder::default(),
                strict_type_validation: false,
                actor: None,
                tenant: None,
            },
        }
    }

    pub fn import_name(mut self, name: &str) -> Self {
        self.job.import_name = name.to_string();
        self
    }

    pub fn source_name(mut self, name: &str) -> Self {
        self.job.source_name = Some(name.to_string());
        self
    }

    pub fn match_fields(mut self, fields: &[&str]) -> Self {
        self.job.match_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn map_field(mut self, field: &str, header: &str) -> Self {
        self.job
            .field_mapping
            .insert(field.to_string(), header.to_string());
        self
    }

    pub fn field_mapping(mut self, mapping: FieldMapping) -> Self {
        self.job.field_mapping = mapping;
        self
    }

    pub fn map_value(mut self, field: &str, slug: &str, target: &str) -> Self {
        self.job
            .value_mapping
            .entry(field.to_string())
            .or_default()
            .insert(slug.to_string(), target.to_string());
        self
    }

    pub fn value_mapping(mut self, mapping: ValueMapping) -> Self {
        self.job.value_mapping = mapping;
        self
    }

    pub fn replace_value(mut self, field: &str, value: &str) -> Self {
        self.job
            .replace_values
            .insert(field.to_string(), value.to_string());
        self
    }

    pub fn date_order(mut self, order: DateOrder) -> Self {
        self.job.date_order = order;
        self
    }

    pub fn strict_type_validation(mut self, strict: bool) -> Self {
        self.job.strict_type_validation = strict;
        self
    }

    pub fn actor(mut self, actor: &str) -> Self {
        self.job.actor = Some(actor.to_string());
        self
    }

    pub fn tenant(mut self, tenant: &str) -> Self {
        self.job.tenant = Some(tenant.to_string());
        self
    }

    /// 构建任务；UpdateOnly / Upsert 必须提供匹配字段
    pub fn build(self) -> ImportResult<ImportJob> {
        let job = self.job;
        if job.policy.needs_match_fields() && job.match_fields.is_empty() {
            return Err(ImportError::InvalidJob(format!(
                "策略 {} 需要至少一个匹配字段",
                job.policy.as_str()
            )));
        }
        if job.match_fields.iter().any(|f| f.trim().is_empty()) {
            return Err(ImportError::InvalidJob("匹配字段名不能为空".to_string()));
        }
        Ok(job)
    }
}

// ==========================================
// ImportJobSpec - 任务描述文件（JSON）
// ==========================================
// CLI 与门面层读取此结构后转换为 ImportJob
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportJobSpec {
    pub import_name: String,
    pub policy: ImportPolicy,
    pub match_fields: Vec<String>,
    pub field_mapping: FieldMapping,
    pub value_mapping: ValueMapping,
    pub replace_values: ReplaceValues,
    pub date_order: DateOrder,
    pub strict_type_validation: bool,
    pub actor: Option<String>,
    pub tenant: Option<String>,
}

impl ImportJobSpec {
    pub fn into_job(self, source_name: Option<&str>) -> ImportResult<ImportJob> {
        let mut builder = ImportJob::builder(self.policy)
            .import_name(&self.import_name)
            .field_mapping(self.field_mapping)
            .value_mapping(self.value_mapping)
            .date_order(self.date_order)
            .strict_type_validation(self.strict_type_validation);

        builder.job.match_fields = self.match_fields;
        builder.job.replace_values = self.replace_values;
        builder.job.actor = self.actor;
        builder.job.tenant = self.tenant;
        if let Some(name) = source_name {
            builder = builder.source_name(name);
        }
        builder.build()
    }
}
