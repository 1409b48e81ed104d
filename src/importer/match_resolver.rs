// ==========================================
// 表格批量导入 - 匹配解析器
// ==========================================
// 职责: 行转换完成后一次性预加载已存在记录，构建 MatchKey → 记录 的映射
// 约束: 只在后端参数上限要求时分块；同键多条记录取最小 id
// ==========================================

use crate::domain::record::{FieldValue, MatchKey, RecordAttributes, StoredRecord};
use crate::domain::schema::RecordSchema;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::record_store::RecordStore;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

pub struct MatchResolver<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    schema: &'a RecordSchema,
    match_fields: &'a [String],
}

impl<'a, S: RecordStore + ?Sized> MatchResolver<'a, S> {
    pub fn new(store: &'a S, schema: &'a RecordSchema, match_fields: &'a [String]) -> Self {
        Self {
            store,
            schema,
            match_fields,
        }
    }

    /// 预加载
    ///
    /// # 参数
    /// - records: 转换成功的行属性集
    ///
    /// # 返回
    /// - MatchKey → 已存在记录（空值键不参与）
    pub fn preload<'r, I>(&self, records: I) -> ImportResult<HashMap<MatchKey, StoredRecord>>
    where
        I: IntoIterator<Item = &'r RecordAttributes>,
    {
        let mut existing = HashMap::new();
        if self.match_fields.is_empty() {
            return Ok(existing);
        }

        // 去重后的取值元组（文件顺序）
        let mut seen: HashSet<MatchKey> = HashSet::new();
        let mut key_values: Vec<Vec<FieldValue>> = Vec::new();
        for attributes in records {
            let Some(key) = MatchKey::from_attributes(attributes, self.match_fields) else {
                continue;
            };
            if seen.insert(key) {
                key_values.push(
                    self.match_fields
                        .iter()
                        .map(|f| attributes.get(f).cloned().unwrap_or(FieldValue::Null))
                        .collect(),
                );
            }
        }
        if key_values.is_empty() {
            return Ok(existing);
        }

        let max_params = self.store.capabilities().max_params;
        let chunk_size = (max_params / self.match_fields.len()).max(1);

        let mut queries = 0;
        for chunk in key_values.chunks(chunk_size) {
            let found = self
                .store
                .find_by_match_fields(self.schema, self.match_fields, chunk)
                .map_err(|e| ImportError::System(format!("预加载已存在记录失败: {}", e)))?;
            queries += 1;

            for record in found {
                let Some(key) = MatchKey::from_attributes(&record.attributes, self.match_fields)
                else {
                    continue;
                };
                match existing.get(&key) {
                    Some(current) if current.id <= record.id => {
                        debug!(key = ?key.0, duplicate_id = record.id, "匹配键对应多条记录，保留最小 id");
                    }
                    _ => {
                        existing.insert(key, record);
                    }
                }
            }
        }

        info!(
            distinct_keys = key_values.len(),
            matched = existing.len(),
            queries,
            "已存在记录预加载完成"
        );
        Ok(existing)
    }
}
