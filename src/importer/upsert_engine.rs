// ==========================================
// 表格批量导入 - 写入引擎
// ==========================================
// 职责: 按导入策略决定每行的新增/更新/跳过，并在单个事务内批量写入
// 红线: 每个输入行恰好一个 RowResult，顺序与输入一致
// 红线: 存储层失败 → 整体回滚 → SystemError
// ==========================================

use crate::domain::job::{ImportJob, ImportPolicy};
use crate::domain::record::{
    MatchKey, RecordAttributes, StoredRecord, SystemStamp, SYSTEM_UPDATE_FIELDS,
};
use crate::domain::report::{RowOutcome, RowResult};
use crate::domain::schema::RecordSchema;
use crate::importer::error::{ImportError, ImportResult, RowError};
use crate::importer::match_resolver::MatchResolver;
use crate::repository::record_store::RecordStore;
use crate::repository::RepositoryResult;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, error, info};

/// 转换后的行: 成功为属性集，失败为错误列表
pub type TransformedRow = Result<RecordAttributes, Vec<RowError>>;

// 匹配键槽位: 指向已存在记录或待新增记录（arena 下标）
#[derive(Debug, Clone, Copy)]
enum Slot {
    Existing(usize),
    Pending(usize),
}

#[derive(Debug)]
struct TrackedRecord {
    id: i64,
    attributes: RecordAttributes,
    changed: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct WritePlan {
    creates: Vec<RecordAttributes>,
    tracked: Vec<TrackedRecord>,
}

pub struct UpsertEngine<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    schema: &'a RecordSchema,
    job: &'a ImportJob,
}

impl<'a, S: RecordStore + ?Sized> UpsertEngine<'a, S> {
    pub fn new(store: &'a S, schema: &'a RecordSchema, job: &'a ImportJob) -> Self {
        Self { store, schema, job }
    }

    /// 在单个事务内完成预加载与写入
    ///
    /// 事务在预加载之前开启，覆盖预加载与全部写入。
    /// 任一阶段失败 → 回滚 → SystemError
    pub fn run(&self, rows: Vec<TransformedRow>, stamp: &SystemStamp) -> ImportResult<Vec<RowResult>> {
        self.store
            .begin()
            .map_err(|e| ImportError::System(format!("开启事务失败: {}", e)))?;

        let outcome = self.preload_and_execute(rows, stamp).and_then(|results| {
            self.store
                .commit()
                .map(|_| results)
                .map_err(|e| ImportError::System(format!("提交事务失败: {}", e)))
        });

        if let Err(e) = &outcome {
            error!(error = %e, "导入写入失败，回滚事务");
            if let Err(rollback_err) = self.store.rollback() {
                error!(error = %rollback_err, "事务回滚失败");
            }
        }
        outcome
    }

    fn preload_and_execute(
        &self,
        rows: Vec<TransformedRow>,
        stamp: &SystemStamp,
    ) -> ImportResult<Vec<RowResult>> {
        let existing = MatchResolver::new(self.store, self.schema, &self.job.match_fields)
            .preload(rows.iter().filter_map(|r| r.as_ref().ok()))?;
        self.execute(rows, existing, stamp)
    }

    /// 决定每行结果并批量写入（调用方负责事务）
    ///
    /// # 参数
    /// - rows: 按输入顺序排列的转换结果
    /// - existing: MatchResolver 预加载结果
    /// - stamp: 系统字段戳
    pub fn execute(
        &self,
        rows: Vec<TransformedRow>,
        existing: HashMap<MatchKey, StoredRecord>,
        stamp: &SystemStamp,
    ) -> ImportResult<Vec<RowResult>> {
        let writable = self.writable_fields();
        let mut plan = WritePlan::default();
        let mut slots: HashMap<MatchKey, Slot> = HashMap::with_capacity(existing.len());

        for (key, record) in existing {
            slots.insert(key, Slot::Existing(plan.tracked.len()));
            plan.tracked.push(TrackedRecord {
                id: record.id,
                attributes: record.attributes,
                changed: BTreeSet::new(),
            });
        }

        let mut results = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            let row_number = index + 1;
            let result = match row {
                Err(errors) => RowResult {
                    row_number,
                    outcome: RowOutcome::Failed,
                    errors: errors.iter().map(ToString::to_string).collect(),
                },
                Ok(attributes) => {
                    let outcome = self.plan_row(&writable, attributes, &mut slots, &mut plan);
                    match outcome {
                        Ok(outcome) => RowResult {
                            row_number,
                            outcome,
                            errors: Vec::new(),
                        },
                        Err((outcome, err)) => RowResult {
                            row_number,
                            outcome,
                            errors: vec![err.to_string()],
                        },
                    }
                }
            };
            results.push(result);
        }

        self.write(&writable, plan, stamp)?;
        Ok(results)
    }

    // 结构顺序中本任务会写入的字段（映射或替代）
    fn writable_fields(&self) -> Vec<String> {
        self.schema
            .fields
            .iter()
            .filter(|f| self.job.covers(&f.name))
            .map(|f| f.name.clone())
            .collect()
    }

    fn plan_row(
        &self,
        writable: &[String],
        attributes: RecordAttributes,
        slots: &mut HashMap<MatchKey, Slot>,
        plan: &mut WritePlan,
    ) -> Result<RowOutcome, (RowOutcome, RowError)> {
        let match_fields = &self.job.match_fields;
        let key = MatchKey::from_attributes(&attributes, match_fields);
        let slot = key.as_ref().and_then(|k| slots.get(k).copied());

        match (self.job.policy, slot) {
            (ImportPolicy::CreateOnly, Some(Slot::Existing(_))) => Err((
                RowOutcome::SkippedExisting,
                RowError::Conflict {
                    message: format!(
                        "记录已存在: {}",
                        MatchKey::describe(&attributes, match_fields)
                    ),
                },
            )),
            (ImportPolicy::CreateOnly, _) => {
                plan.creates.push(attributes);
                Ok(RowOutcome::Created)
            }
            (_, Some(Slot::Existing(idx))) => {
                apply_update(&mut plan.tracked[idx], writable, &attributes);
                Ok(RowOutcome::Updated)
            }
            (ImportPolicy::Upsert, Some(Slot::Pending(idx))) => {
                let pending = &mut plan.creates[idx];
                for field in writable {
                    if let Some(value) = attributes.get(field) {
                        pending.insert(field.clone(), value.clone());
                    }
                }
                Ok(RowOutcome::Updated)
            }
            (ImportPolicy::UpdateOnly, _) => Err((
                RowOutcome::SkippedMissing,
                RowError::Conflict {
                    message: format!(
                        "未找到匹配记录: {}",
                        MatchKey::describe(&attributes, match_fields)
                    ),
                },
            )),
            (ImportPolicy::Upsert, None) => {
                if let Some(key) = key {
                    slots.insert(key, Slot::Pending(plan.creates.len()));
                }
                plan.creates.push(attributes);
                Ok(RowOutcome::Created)
            }
        }
    }

    // ===== 批量写入 =====

    fn write(&self, writable: &[String], plan: WritePlan, stamp: &SystemStamp) -> ImportResult<()> {
        let groups = group_updates(plan.tracked);
        if plan.creates.is_empty() && groups.is_empty() {
            debug!("无需写入");
            return Ok(());
        }

        let (created, updated) = self
            .write_batches(writable, &plan.creates, &groups, stamp)
            .map_err(|e| ImportError::System(format!("批量写入失败: {}", e)))?;
        info!(created, updated, update_groups = groups.len(), "批量写入完成");
        Ok(())
    }

    fn write_batches(
        &self,
        writable: &[String],
        creates: &[RecordAttributes],
        groups: &BTreeMap<Vec<String>, Vec<(i64, RecordAttributes)>>,
        stamp: &SystemStamp,
    ) -> RepositoryResult<(usize, usize)> {
        let caps = self.store.capabilities();

        let mut created = 0;
        for batch in creates.chunks(caps.create_batch_size.max(1)) {
            let records: Vec<RecordAttributes> = batch
                .iter()
                .map(|attrs| {
                    attrs
                        .iter()
                        .filter(|(field, _)| writable.contains(*field))
                        .map(|(field, value)| (field.clone(), value.clone()))
                        .collect()
                })
                .collect();
            created += self.store.bulk_create(self.schema, &records, stamp)?.len();
        }

        let mut updated = 0;
        for (fields, updates) in groups {
            for batch in updates.chunks(caps.update_batch_size.max(1)) {
                updated += self.store.bulk_update(self.schema, fields, batch, stamp)?;
            }
        }

        Ok((created, updated))
    }
}

fn apply_update(record: &mut TrackedRecord, writable: &[String], attributes: &RecordAttributes) {
    for field in writable {
        let Some(value) = attributes.get(field) else {
            continue;
        };
        if record.attributes.get(field) != Some(value) {
            record.attributes.insert(field.clone(), value.clone());
            record.changed.insert(field.clone());
        }
    }
    for field in SYSTEM_UPDATE_FIELDS {
        record.changed.insert(field.to_string());
    }
}

// 按变更字段集分组（去掉系统字段，由存储层追加）；未被触及的记录不写
fn group_updates(tracked: Vec<TrackedRecord>) -> BTreeMap<Vec<String>, Vec<(i64, RecordAttributes)>> {
    let mut groups: BTreeMap<Vec<String>, Vec<(i64, RecordAttributes)>> = BTreeMap::new();
    let mut ordered: Vec<TrackedRecord> = tracked
        .into_iter()
        .filter(|r| !r.changed.is_empty())
        .collect();
    ordered.sort_by_key(|r| r.id);

    for record in ordered {
        let fields: Vec<String> = record
            .changed
            .iter()
            .filter(|f| !SYSTEM_UPDATE_FIELDS.contains(&f.as_str()))
            .cloned()
            .collect();
        groups
            .entry(fields)
            .or_default()
            .push((record.id, record.attributes));
    }
    groups
}
