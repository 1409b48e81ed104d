// ==========================================
// 表格批量导入 - 行转换器实现
// ==========================================
// 职责: 单行原始文本 → 强类型属性集
// 优先级（按字段描述顺序逐字段）:
// 1. 空值且有替代值 → 替代值
// 2. 引用字段 → slug → 预加载的 id 查找表
// 3. 选项字段 → slug → 值映射 → 合法 code → 替代值
// 4. 标量转换（整数/小数/布尔/日期/日期时间）
// 约束: 一行内所有字段都会被评估，错误全部收集
// ==========================================

use crate::domain::job::{DateOrder, ImportJob};
use crate::domain::record::{FieldValue, RawRow, RecordAttributes};
use crate::domain::schema::{FieldKind, RecordSchema, SchemaField};
use crate::importer::error::RowError;
use crate::importer::importer_trait::RowTransformer as RowTransformerTrait;
use crate::importer::similarity::{normalize, slugify};
use crate::importer::value_parser;
use std::collections::HashMap;

/// 非查找类字段的文本 → 值转换（替代值校验与行转换共用）
///
/// 选项字段只接受合法 code，引用字段只接受合法 id 或精确显示名
pub fn coerce_scalar(
    field: &SchemaField,
    raw: &str,
    date_order: DateOrder,
) -> Result<FieldValue, String> {
    let value = raw.trim();
    let label = &field.verbose_name;

    match field.kind {
        FieldKind::Text | FieldKind::Email | FieldKind::Url => Ok(FieldValue::Text(value.to_string())),
        FieldKind::Integer => value_parser::parse_integer(value)
            .map(FieldValue::Integer)
            .ok_or_else(|| format!("{}: 无法将 '{}' 解析为整数", label, value)),
        FieldKind::Decimal => value_parser::parse_decimal(value)
            .map(FieldValue::Decimal)
            .ok_or_else(|| format!("{}: 无法将 '{}' 解析为小数", label, value)),
        FieldKind::Boolean => value_parser::parse_boolean(value)
            .map(FieldValue::Boolean)
            .ok_or_else(|| format!("{}: 无法将 '{}' 解析为布尔值", label, value)),
        FieldKind::Date => value_parser::parse_date(value, date_order)
            .map(FieldValue::Date)
            .ok_or_else(|| {
                format!(
                    "{}: 无效的日期 '{}'（支持 YYYY-MM-DD、MM/DD/YYYY、DD/MM/YYYY）",
                    label, value
                )
            }),
        FieldKind::DateTime => value_parser::parse_datetime(value, date_order)
            .map(FieldValue::DateTime)
            .ok_or_else(|| format!("{}: 无效的日期时间 '{}'", label, value)),
        FieldKind::Choice => {
            if field.has_choice_code(value) {
                Ok(FieldValue::Text(value.to_string()))
            } else {
                Err(format!("{}: 未映射的取值 '{}'", label, value))
            }
        }
        FieldKind::Reference => {
            let normalized = normalize(value);
            field
                .reference_targets
                .iter()
                .find(|t| t.id.to_string() == value || normalize(&t.label) == normalized)
                .map(|t| FieldValue::Reference(t.id))
                .ok_or_else(|| format!("{}: 未映射的引用 '{}'", label, value))
        }
    }
}

// ==========================================
// RowTransformer - 每个任务构建一次
// ==========================================
pub struct RowTransformer<'a> {
    schema: &'a RecordSchema,
    job: &'a ImportJob,
    // 字段名 → {slug → 引用 id}
    reference_cache: HashMap<&'a str, HashMap<String, i64>>,
}

impl<'a> RowTransformer<'a> {
    pub fn new(schema: &'a RecordSchema, job: &'a ImportJob) -> Self {
        let mut reference_cache = HashMap::new();

        for field in schema.fields.iter().filter(|f| f.kind == FieldKind::Reference) {
            let mut ids: HashMap<String, i64> = HashMap::new();
            for target in &field.reference_targets {
                ids.insert(slugify(&target.label), target.id);
                ids.insert(target.id.to_string(), target.id);
            }
            // 显式值映射覆盖自动推断
            if let Some(entries) = job.value_mapping.get(&field.name) {
                for (slug, target) in entries {
                    if let Ok(id) = target.trim().parse::<i64>() {
                        ids.insert(slug.clone(), id);
                    }
                }
            }
            reference_cache.insert(field.name.as_str(), ids);
        }

        Self {
            schema,
            job,
            reference_cache,
        }
    }

    /// 单元格 → 值；未映射字段返回 None
    fn transform_field(&self, field: &SchemaField, row: &RawRow) -> Option<Result<FieldValue, RowError>> {
        let replace = self.job.replace_values.get(&field.name);

        let raw = match self.job.header_for(&field.name) {
            Some(header) => row.get(header).map(|v| v.trim()).unwrap_or(""),
            None => {
                // 未映射但有替代值: 每行都使用替代值
                return replace.map(|r| self.coerce(field, r));
            }
        };

        if raw.is_empty() {
            return Some(match replace {
                Some(r) => self.coerce(field, r),
                // 布尔空值即 false，必填也不报错
                None if field.kind == FieldKind::Boolean => Ok(FieldValue::Boolean(false)),
                None if field.required => Err(RowError::validation(
                    &field.name,
                    format!("{}: 必填字段为空", field.verbose_name),
                )),
                None => Ok(FieldValue::Null),
            });
        }

        let result = match field.kind {
            FieldKind::Reference => self.resolve_reference(field, raw),
            FieldKind::Choice => self.resolve_choice(field, raw, replace),
            _ => self.coerce(field, raw),
        };
        Some(result)
    }

    fn coerce(&self, field: &SchemaField, raw: &str) -> Result<FieldValue, RowError> {
        coerce_scalar(field, raw, self.job.date_order)
            .map_err(|message| RowError::validation(&field.name, message))
    }

    fn resolve_reference(&self, field: &SchemaField, raw: &str) -> Result<FieldValue, RowError> {
        self.reference_cache
            .get(field.name.as_str())
            .and_then(|ids| ids.get(&slugify(raw)))
            .map(|id| FieldValue::Reference(*id))
            .ok_or_else(|| {
                RowError::validation(
                    &field.name,
                    format!("{}: 未映射的引用 '{}'", field.verbose_name, raw),
                )
            })
    }

    fn resolve_choice(
        &self,
        field: &SchemaField,
        raw: &str,
        replace: Option<&String>,
    ) -> Result<FieldValue, RowError> {
        let mapped = self
            .job
            .value_mapping
            .get(&field.name)
            .and_then(|entries| entries.get(&slugify(raw)));

        if let Some(code) = mapped {
            return Ok(FieldValue::Text(code.clone()));
        }
        if field.has_choice_code(raw) {
            return Ok(FieldValue::Text(raw.to_string()));
        }
        match replace {
            Some(r) => self.coerce(field, r),
            None => Err(RowError::validation(
                &field.name,
                format!("{}: 未映射的取值 '{}'", field.verbose_name, raw),
            )),
        }
    }
}

impl RowTransformerTrait for RowTransformer<'_> {
    fn transform_row(&self, row: &RawRow) -> Result<RecordAttributes, Vec<RowError>> {
        let mut attributes = RecordAttributes::new();
        let mut errors = Vec::new();

        for field in &self.schema.fields {
            match self.transform_field(field, row) {
                Some(Ok(value)) => {
                    attributes.insert(field.name.clone(), value);
                }
                Some(Err(err)) => errors.push(err),
                None => {}
            }
        }

        if errors.is_empty() {
            Ok(attributes)
        } else {
            Err(errors)
        }
    }
}
