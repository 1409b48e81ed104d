// ==========================================
// 表格批量导入 - 值映射器实现
// ==========================================
// 职责: 选项字段源值 → code，引用字段源值 → id
// 规则: 规范化精确匹配优先，否则取相似度 >= 阈值的最优候选
// 平局: 描述顺序中先出现的选项；同一选项先比 code 后比 label
// ==========================================

use crate::domain::job::FieldMapping;
use crate::domain::record::RawRow;
use crate::domain::schema::{FieldKind, RecordSchema, SchemaField};
use crate::importer::importer_trait::{ValueMapper as ValueMapperTrait, ValueMappingOutcome};
use crate::importer::similarity::{best_match, normalize, slugify};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

pub struct ValueMapper {
    threshold: f64,
}

impl ValueMapper {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// 单个源值 → 目标（code 或 id 文本）
    pub fn resolve(&self, field: &SchemaField, raw: &str) -> Option<String> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return None;
        }
        let accept = |score: f64| score >= self.threshold;

        match field.kind {
            FieldKind::Choice => {
                let exact = field.choices.iter().find(|c| {
                    normalize(&c.code) == normalized || normalize(&c.label) == normalized
                });
                if let Some(option) = exact {
                    return Some(option.code.clone());
                }

                let candidates = field.choices.iter().flat_map(|c| {
                    [(c.code.as_str(), c.code.as_str()), (c.code.as_str(), c.label.as_str())]
                });
                best_match(raw, candidates, accept).map(|(code, _)| code.to_string())
            }
            FieldKind::Reference => {
                let exact = field.reference_targets.iter().find(|t| {
                    normalize(&t.label) == normalized || t.id.to_string() == raw.trim()
                });
                if let Some(target) = exact {
                    return Some(target.id.to_string());
                }

                let candidates = field
                    .reference_targets
                    .iter()
                    .map(|t| (t.id, t.label.as_str()));
                best_match(raw, candidates, accept).map(|(id, _)| id.to_string())
            }
            _ => None,
        }
    }
}

impl Default for ValueMapper {
    fn default() -> Self {
        Self::new(0.7)
    }
}

impl ValueMapperTrait for ValueMapper {
    fn map_values(
        &self,
        schema: &RecordSchema,
        field_mapping: &FieldMapping,
        rows: &[RawRow],
    ) -> ValueMappingOutcome {
        let mut outcome = ValueMappingOutcome::default();

        for field in schema.fields.iter().filter(|f| f.kind.is_lookup()) {
            let Some(header) = field_mapping.get(&field.name) else {
                continue;
            };

            let mut seen: HashSet<String> = HashSet::new();
            let mut resolved = BTreeMap::new();
            let mut unmapped = Vec::new();

            for row in rows {
                let raw = match row.get(header) {
                    Some(v) if !v.trim().is_empty() => v.trim(),
                    _ => continue,
                };
                let slug = slugify(raw);
                if !seen.insert(slug.clone()) {
                    continue;
                }

                match self.resolve(field, raw).filter(|_| !slug.is_empty()) {
                    Some(target) => {
                        resolved.insert(slug, target);
                    }
                    None => unmapped.push(raw.to_string()),
                }
            }

            debug!(
                field = %field.name,
                mapped = resolved.len(),
                unmapped = unmapped.len(),
                "值映射完成"
            );
            if !resolved.is_empty() {
                outcome.mapping.insert(field.name.clone(), resolved);
            }
            if !unmapped.is_empty() {
                outcome.unmapped.insert(field.name.clone(), unmapped);
            }
        }

        outcome
    }
}
