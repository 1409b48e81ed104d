// ==========================================
// 表格批量导入 - 预检校验器实现
// ==========================================
// 职责: 行处理前的一次性结构与类型检查
// 致命: 必填未覆盖 / 未知字段或表头 / 表头重复映射 / 匹配字段无效 /
//       值映射目标非法 / 替代值无法转换
// 警告: 抽样类型不符（严格模式下为致命）/ 文本列疑似误判
// ==========================================

use crate::domain::job::ImportJob;
use crate::domain::record::RawRow;
use crate::domain::report::{ImportIssue, IssueKind};
use crate::domain::schema::{FieldKind, RecordSchema, SchemaField};
use crate::importer::importer_trait::TypeValidator as TypeValidatorTrait;
use crate::importer::row_transformer::coerce_scalar;
use crate::importer::value_parser;
use std::collections::{HashMap, HashSet};

pub struct TypeValidator {
    sample_size: usize,
    text_heuristic_ratio: f64,
}

impl TypeValidator {
    pub fn new(sample_size: usize, text_heuristic_ratio: f64) -> Self {
        Self {
            sample_size,
            text_heuristic_ratio,
        }
    }

    /// 取列内前 N 个不同的非空值（文件顺序）
    fn sample_column(&self, header: &str, rows: &[RawRow]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut samples = Vec::new();
        for row in rows {
            if samples.len() >= self.sample_size {
                break;
            }
            if let Some(value) = row.get(header).map(|v| v.trim()) {
                if !value.is_empty() && seen.insert(value.to_string()) {
                    samples.push(value.to_string());
                }
            }
        }
        samples
    }

    fn check_mapping(
        &self,
        schema: &RecordSchema,
        job: &ImportJob,
        headers: &[String],
    ) -> Vec<ImportIssue> {
        let mut issues = Vec::new();
        let header_set: HashSet<&str> = headers.iter().map(String::as_str).collect();
        let mut header_usage: HashMap<&str, Vec<&str>> = HashMap::new();

        for (field_name, header) in &job.field_mapping {
            if schema.field(field_name).is_none() {
                issues.push(ImportIssue::fatal(
                    IssueKind::UnknownField,
                    field_name,
                    Some(header.as_str()),
                    format!("映射中的字段 '{}' 不存在", field_name),
                ));
            }
            if !header_set.contains(header.as_str()) {
                issues.push(ImportIssue::fatal(
                    IssueKind::UnknownHeader,
                    field_name,
                    Some(header.as_str()),
                    format!("文件中没有表头 '{}'", header),
                ));
            }
            header_usage
                .entry(header.as_str())
                .or_default()
                .push(field_name.as_str());
        }

        for (header, fields) in header_usage.iter().filter(|(_, f)| f.len() > 1) {
            issues.push(ImportIssue::fatal(
                IssueKind::DuplicateHeader,
                fields[0],
                Some(*header),
                format!("表头 '{}' 被映射到多个字段: {}", header, fields.join(", ")),
            ));
        }

        for field in schema.fields.iter().filter(|f| f.required) {
            if !job.covers(&field.name) {
                issues.push(ImportIssue::fatal(
                    IssueKind::RequiredUnmapped,
                    &field.name,
                    None,
                    format!("必填字段 '{}' 未映射且没有替代值", field.verbose_name),
                ));
            }
        }

        for name in &job.match_fields {
            if schema.field(name).is_none() {
                issues.push(ImportIssue::fatal(
                    IssueKind::UnknownMatchField,
                    name,
                    None,
                    format!("匹配字段 '{}' 不存在", name),
                ));
            } else if !job.covers(name) {
                issues.push(ImportIssue::fatal(
                    IssueKind::UnknownMatchField,
                    name,
                    None,
                    format!("匹配字段 '{}' 未映射且没有替代值", name),
                ));
            }
        }

        issues
    }

    fn check_value_targets(&self, schema: &RecordSchema, job: &ImportJob) -> Vec<ImportIssue> {
        let mut issues = Vec::new();

        for (field_name, entries) in &job.value_mapping {
            let Some(field) = schema.field(field_name) else {
                issues.push(ImportIssue::fatal(
                    IssueKind::UnknownField,
                    field_name,
                    None,
                    format!("值映射中的字段 '{}' 不存在", field_name),
                ));
                continue;
            };

            for (slug, target) in entries {
                let valid = match field.kind {
                    FieldKind::Choice => field.has_choice_code(target),
                    FieldKind::Reference => target
                        .trim()
                        .parse::<i64>()
                        .map(|id| field.has_reference_id(id))
                        .unwrap_or(false),
                    _ => false,
                };
                if !valid {
                    issues.push(ImportIssue::fatal(
                        IssueKind::InvalidMappingTarget,
                        field_name,
                        None,
                        format!(
                            "字段 '{}' 的值映射 '{}' → '{}' 不是合法目标",
                            field.verbose_name, slug, target
                        ),
                    ));
                }
            }
        }

        for (field_name, value) in &job.replace_values {
            match schema.field(field_name) {
                None => issues.push(ImportIssue::fatal(
                    IssueKind::UnknownField,
                    field_name,
                    None,
                    format!("替代值中的字段 '{}' 不存在", field_name),
                )),
                Some(field) => {
                    if let Err(message) = coerce_scalar(field, value, job.date_order) {
                        issues.push(ImportIssue::fatal(
                            IssueKind::InvalidReplaceValue,
                            field_name,
                            None,
                            format!("替代值无效 - {}", message),
                        ));
                    }
                }
            }
        }

        issues
    }

    fn check_samples(
        &self,
        field: &SchemaField,
        header: &str,
        samples: &[String],
        job: &ImportJob,
    ) -> Option<ImportIssue> {
        let conforms = |v: &str| match field.kind {
            FieldKind::Integer => value_parser::parse_integer(v).is_some(),
            FieldKind::Decimal => value_parser::parse_decimal(v).is_some(),
            FieldKind::Boolean => value_parser::parse_boolean(v).is_some(),
            FieldKind::Date => value_parser::parse_date(v, job.date_order).is_some(),
            FieldKind::DateTime => value_parser::parse_datetime(v, job.date_order).is_some(),
            FieldKind::Email => value_parser::is_email(v),
            FieldKind::Url => value_parser::is_url(v),
            FieldKind::Text | FieldKind::Choice | FieldKind::Reference => true,
        };

        let invalid: Vec<&str> = samples
            .iter()
            .map(String::as_str)
            .filter(|v| !conforms(*v))
            .collect();
        if invalid.is_empty() {
            return None;
        }

        let message = format!(
            "列 '{}' 与字段 '{}' ({}) 类型不符，示例: {}",
            header,
            field.verbose_name,
            field.kind.label(),
            invalid
                .iter()
                .take(3)
                .map(|v| format!("'{}'", v))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Some(if job.strict_type_validation {
            ImportIssue::fatal(IssueKind::TypeMismatch, &field.name, Some(header), message)
        } else {
            ImportIssue::warning(IssueKind::TypeMismatch, &field.name, Some(header), message)
        })
    }

    /// 文本列启发式: 日期 > 邮箱 > 数字
    fn check_text_heuristic(
        &self,
        field: &SchemaField,
        header: &str,
        samples: &[String],
    ) -> Option<ImportIssue> {
        if samples.is_empty() {
            return None;
        }
        let ratio = |pred: fn(&str) -> bool| {
            samples.iter().filter(|v| pred(v.as_str())).count() as f64 / samples.len() as f64
        };

        let looks_like = if ratio(value_parser::looks_like_date) >= self.text_heuristic_ratio {
            "日期"
        } else if ratio(value_parser::is_email) >= self.text_heuristic_ratio {
            "邮箱"
        } else if ratio(value_parser::looks_like_number) >= self.text_heuristic_ratio {
            "数字"
        } else {
            return None;
        };

        Some(ImportIssue::warning(
            IssueKind::LikelyMistyped,
            &field.name,
            Some(header),
            format!(
                "文本字段 '{}' 的列 '{}' 看起来是{}",
                field.verbose_name, header, looks_like
            ),
        ))
    }
}

impl Default for TypeValidator {
    fn default() -> Self {
        Self::new(10, 0.8)
    }
}

impl TypeValidatorTrait for TypeValidator {
    fn validate(
        &self,
        schema: &RecordSchema,
        job: &ImportJob,
        headers: &[String],
        rows: &[RawRow],
    ) -> Vec<ImportIssue> {
        let mut issues = self.check_mapping(schema, job, headers);
        issues.extend(self.check_value_targets(schema, job));

        for field in &schema.fields {
            let Some(header) = job.header_for(&field.name) else {
                continue;
            };
            let samples = self.sample_column(header, rows);

            let issue = if field.kind == FieldKind::Text {
                self.check_text_heuristic(field, header, &samples)
            } else {
                self.check_samples(field, header, &samples, job)
            };
            issues.extend(issue);
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::ImportPolicy;
    use crate::domain::report::IssueSeverity;

    fn schema() -> RecordSchema {
        RecordSchema::new(
            "members",
            vec![
                SchemaField::new("external_id", "External ID", FieldKind::Text).required(),
                SchemaField::new("joined", "Join Date", FieldKind::Date),
                SchemaField::new("status", "Status", FieldKind::Choice)
                    .with_choices(&[("yes", "Yes"), ("no", "No")]),
                SchemaField::new("notes", "Notes", FieldKind::Text),
            ],
        )
    }

    fn headers() -> Vec<String> {
        vec!["ID".to_string(), "Joined".to_string(), "Notes".to_string()]
    }

    fn rows(joined: &[&str]) -> Vec<RawRow> {
        joined
            .iter()
            .enumerate()
            .map(|(i, j)| {
                let mut row = RawRow::new();
                row.insert("ID".to_string(), format!("E{}", i));
                row.insert("Joined".to_string(), j.to_string());
                row.insert("Notes".to_string(), "2024-01-01".to_string());
                row
            })
            .collect()
    }

    fn kinds(issues: &[ImportIssue]) -> Vec<IssueKind> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn test_required_field_unmapped_is_fatal() {
        let job = ImportJob::builder(ImportPolicy::CreateOnly)
            .map_field("joined", "Joined")
            .build()
            .unwrap();
        let issues = TypeValidator::default().validate(&schema(), &job, &headers(), &rows(&[]));

        let required: Vec<_> = issues
            .iter()
            .filter(|i| i.kind == IssueKind::RequiredUnmapped)
            .collect();
        assert_eq!(required.len(), 1);
        assert!(required[0].is_fatal());
        assert!(required[0].message.contains("External ID"));
    }

    #[test]
    fn test_mapping_errors() {
        let job = ImportJob::builder(ImportPolicy::Upsert)
            .match_fields(&["ghost"])
            .map_field("external_id", "ID")
            .map_field("notes", "ID")
            .map_field("unknown", "Missing")
            .map_value("status", "maybe", "perhaps")
            .replace_value("joined", "not a date")
            .build()
            .unwrap();
        let issues = TypeValidator::default().validate(&schema(), &job, &headers(), &rows(&[]));
        let found = kinds(&issues);

        assert!(found.contains(&IssueKind::UnknownField));
        assert!(found.contains(&IssueKind::UnknownHeader));
        assert!(found.contains(&IssueKind::DuplicateHeader));
        assert!(found.contains(&IssueKind::UnknownMatchField));
        assert!(found.contains(&IssueKind::InvalidMappingTarget));
        assert!(found.contains(&IssueKind::InvalidReplaceValue));
        assert!(issues.iter().all(|i| i.is_fatal()));
    }

    #[test]
    fn test_type_sample_mismatch_is_warning_by_default() {
        let job = ImportJob::builder(ImportPolicy::CreateOnly)
            .map_field("external_id", "ID")
            .map_field("joined", "Joined")
            .build()
            .unwrap();
        let issues = TypeValidator::default().validate(
            &schema(),
            &job,
            &headers(),
            &rows(&["2024-01-05", "31/31/2024"]),
        );

        let mismatch = issues
            .iter()
            .find(|i| i.kind == IssueKind::TypeMismatch)
            .unwrap();
        assert_eq!(mismatch.severity, IssueSeverity::Warning);
        assert!(mismatch.message.contains("31/31/2024"));
    }

    #[test]
    fn test_type_sample_mismatch_fatal_when_strict() {
        let job = ImportJob::builder(ImportPolicy::CreateOnly)
            .map_field("external_id", "ID")
            .map_field("joined", "Joined")
            .strict_type_validation(true)
            .build()
            .unwrap();
        let issues =
            TypeValidator::default().validate(&schema(), &job, &headers(), &rows(&["nope"]));

        assert!(issues
            .iter()
            .any(|i| i.kind == IssueKind::TypeMismatch && i.is_fatal()));
    }

    #[test]
    fn test_text_column_that_looks_like_dates() {
        let job = ImportJob::builder(ImportPolicy::CreateOnly)
            .map_field("external_id", "ID")
            .map_field("notes", "Notes")
            .build()
            .unwrap();
        let issues =
            TypeValidator::default().validate(&schema(), &job, &headers(), &rows(&["2024-01-01"]));

        let hint = issues
            .iter()
            .find(|i| i.kind == IssueKind::LikelyMistyped)
            .unwrap();
        assert_eq!(hint.field, "notes");
        assert!(!hint.is_fatal());
    }

    #[test]
    fn test_clean_job_has_no_issues() {
        let job = ImportJob::builder(ImportPolicy::CreateOnly)
            .map_field("external_id", "ID")
            .map_field("joined", "Joined")
            .map_value("status", "y", "yes")
            .replace_value("status", "no")
            .build()
            .unwrap();
        let issues = TypeValidator::default().validate(
            &schema(),
            &job,
            &headers(),
            &rows(&["2024-01-05", "02/03/2024"]),
        );
        assert!(issues.is_empty(), "{:?}", issues);
    }
}
