// ==========================================
// 表格批量导入 - 表头映射器实现
// ==========================================
// 职责: 源表头 → 结构字段的自动推断
// 规则: 精确匹配优先；模糊匹配按文件顺序贪心，相似度严格大于阈值
// ==========================================

use crate::domain::job::FieldMapping;
use crate::domain::schema::{RecordSchema, SchemaField};
use crate::importer::importer_trait::HeaderMapper as HeaderMapperTrait;
use crate::importer::similarity::{best_match_by, header_ratio, normalize};
use std::collections::HashSet;
use tracing::debug;

pub struct HeaderMapper {
    threshold: f64,
}

impl HeaderMapper {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for HeaderMapper {
    fn default() -> Self {
        Self::new(0.6)
    }
}

impl HeaderMapperTrait for HeaderMapper {
    fn map_headers(&self, headers: &[String], schema: &RecordSchema) -> FieldMapping {
        let mut mapping = FieldMapping::new();
        let mut bound_fields: HashSet<&str> = HashSet::new();
        let mut bound_headers: HashSet<&str> = HashSet::new();

        // ===== 第一轮: 规范化精确匹配（先字段名，再显示名）=====
        let exact_passes: [fn(&SchemaField) -> &str; 2] = [field_name, field_verbose_name];
        for label_of in exact_passes {
            for header in headers {
                if bound_headers.contains(header.as_str()) {
                    continue;
                }
                let normalized = normalize(header);
                if normalized.is_empty() {
                    continue;
                }

                let exact = schema.fields.iter().find(|f| {
                    !bound_fields.contains(f.name.as_str()) && normalize(label_of(f)) == normalized
                });
                if let Some(field) = exact {
                    bind(&mut mapping, &mut bound_fields, &mut bound_headers, field, header);
                }
            }
        }

        // ===== 第二轮: 模糊匹配（文件顺序）=====
        for header in headers {
            if bound_headers.contains(header.as_str()) || normalize(header).is_empty() {
                continue;
            }

            let free: Vec<&SchemaField> = schema
                .fields
                .iter()
                .filter(|f| !bound_fields.contains(f.name.as_str()))
                .collect();
            if free.is_empty() {
                break;
            }

            let accept = |score: f64| score > self.threshold;
            let by_name = best_match_by(
                header,
                free.iter().map(|f| (*f, f.name.as_str())),
                header_ratio,
                accept,
            );
            let candidate = by_name.or_else(|| {
                best_match_by(
                    header,
                    free.iter().map(|f| (*f, f.verbose_name.as_str())),
                    header_ratio,
                    accept,
                )
            });

            if let Some((field, score)) = candidate {
                debug!(header = %header, field = %field.name, score, "表头模糊匹配");
                bind(&mut mapping, &mut bound_fields, &mut bound_headers, field, header);
            }
        }

        mapping
    }
}

fn field_name(field: &SchemaField) -> &str {
    &field.name
}

fn field_verbose_name(field: &SchemaField) -> &str {
    &field.verbose_name
}

fn bind<'a>(
    mapping: &mut FieldMapping,
    bound_fields: &mut HashSet<&'a str>,
    bound_headers: &mut HashSet<&'a str>,
    field: &'a SchemaField,
    header: &'a str,
) {
    mapping.insert(field.name.clone(), header.to_string());
    bound_fields.insert(field.name.as_str());
    bound_headers.insert(header);
}
