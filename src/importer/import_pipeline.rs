// ==========================================
// 表格批量导入 - 导入管道
// ==========================================
// 职责: 串联各阶段，从表头 + 原始行到导入报告
// 流程: 值映射 → 预检 → 建表 → 行转换 → 预加载 → 写入 → 报告
// 红线: 致命预检问题在任何行处理前返回 SchemaError
// ==========================================

use crate::config::ImportSettings;
use crate::domain::job::{FieldMapping, ImportJob, ImportPolicy, ValueMapping};
use crate::domain::record::{RawRow, SystemStamp};
use crate::domain::report::{ImportIssue, ImportReport, IssueKind, MappingPreview};
use crate::domain::schema::RecordSchema;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::error_reporter::ErrorReporter;
use crate::importer::header_mapper::HeaderMapper as HeaderMapperImpl;
use crate::importer::importer_trait::{
    HeaderMapper, RowTransformer as _, TypeValidator, ValueMapper,
};
use crate::importer::row_transformer::RowTransformer;
use crate::importer::similarity::slugify;
use crate::importer::type_validator::TypeValidator as TypeValidatorImpl;
use crate::importer::upsert_engine::{TransformedRow, UpsertEngine};
use crate::importer::value_mapper::ValueMapper as ValueMapperImpl;
use crate::repository::record_store::RecordStore;
use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// 预览中展示的样例行数
pub const PREVIEW_SAMPLE_ROWS: usize = 3;

// ==========================================
// ImportPipeline
// ==========================================
pub struct ImportPipeline<S>
where
    S: RecordStore,
{
    // 数据访问层
    store: S,

    // 目标结构与配置快照
    schema: RecordSchema,
    settings: ImportSettings,

    // 导入组件
    header_mapper: Box<dyn HeaderMapper>,
    value_mapper: Box<dyn ValueMapper>,
    type_validator: Box<dyn TypeValidator>,
    reporter: ErrorReporter,
}

impl<S> ImportPipeline<S>
where
    S: RecordStore,
{
    /// 按配置快照构建默认组件
    pub fn new(store: S, schema: RecordSchema, settings: ImportSettings) -> Self {
        let header_mapper = Box::new(HeaderMapperImpl::new(settings.header_match_threshold));
        let value_mapper = Box::new(ValueMapperImpl::new(settings.value_match_threshold));
        let type_validator = Box::new(TypeValidatorImpl::new(
            settings.sample_size,
            settings.text_heuristic_ratio,
        ));
        let reporter = ErrorReporter::new(
            settings.summary_error_limit,
            settings.error_report_dir.clone(),
        );

        Self {
            store,
            schema,
            settings,
            header_mapper,
            value_mapper,
            type_validator,
            reporter,
        }
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ==========================================
    // 分析（不写库）
    // ==========================================

    /// 自动推断映射并预检，返回预览
    #[instrument(skip_all, fields(record_type = %self.schema.record_type, total_rows = rows.len()))]
    pub fn analyze(&self, headers: &[String], rows: &[RawRow]) -> ImportResult<MappingPreview> {
        let field_mapping = self.header_mapper.map_headers(headers, &self.schema);
        let unmapped_headers: Vec<String> = headers
            .iter()
            .filter(|h| !field_mapping.values().any(|mapped| mapped == *h))
            .cloned()
            .collect();

        let values = self
            .value_mapper
            .map_values(&self.schema, &field_mapping, rows);

        let provisional = ImportJob::builder(ImportPolicy::CreateOnly)
            .field_mapping(field_mapping.clone())
            .value_mapping(values.mapping.clone())
            .build()?;

        let mut issues = self
            .type_validator
            .validate(&self.schema, &provisional, headers, rows);
        issues.extend(self.unmapped_value_issues(
            &field_mapping,
            &values.mapping,
            &values.unmapped,
        ));

        info!(
            mapped_fields = field_mapping.len(),
            unmapped_headers = unmapped_headers.len(),
            issues = issues.len(),
            "映射分析完成"
        );

        Ok(MappingPreview {
            headers: headers.to_vec(),
            field_mapping,
            unmapped_headers,
            value_mapping: values.mapping,
            unmapped_values: values.unmapped,
            issues,
            sample_rows: rows.iter().take(PREVIEW_SAMPLE_ROWS).cloned().collect(),
        })
    }

    // ==========================================
    // 执行导入
    // ==========================================

    /// 执行一次导入任务
    ///
    /// # 返回
    /// - Ok(ImportReport): 行级错误都在报告内
    /// - Err(Schema / InvalidJob): 预检失败，未处理任何行
    /// - Err(System): 写入失败，已回滚
    #[instrument(skip_all, fields(
        job_id = %job.job_id,
        record_type = %self.schema.record_type,
        policy = job.policy.as_str(),
        total_rows = rows.len()
    ))]
    pub fn run(
        &self,
        job: ImportJob,
        headers: &[String],
        rows: &[RawRow],
    ) -> ImportResult<ImportReport> {
        let started = Instant::now();
        info!("开始导入");

        // === 阶段 1: 值映射（调用方条目优先）===
        let auto = self
            .value_mapper
            .map_values(&self.schema, &job.field_mapping, rows);
        let job = ImportJob {
            value_mapping: merge_value_mapping(job.value_mapping, auto.mapping),
            ..job
        };
        let mut warnings =
            self.unmapped_value_issues(&job.field_mapping, &job.value_mapping, &auto.unmapped);

        // === 阶段 2: 预检 ===
        let issues = self
            .type_validator
            .validate(&self.schema, &job, headers, rows);
        let (fatal, non_fatal): (Vec<ImportIssue>, Vec<ImportIssue>) =
            issues.into_iter().partition(ImportIssue::is_fatal);
        if !fatal.is_empty() {
            warn!(fatal = fatal.len(), "预检发现致命问题，任务中止");
            return Err(ImportError::Schema(fatal));
        }
        warnings.extend(non_fatal);
        debug!(warnings = warnings.len(), "预检通过");

        self.store
            .ensure_table(&self.schema)
            .map_err(|e| ImportError::System(format!("准备目标表失败: {}", e)))?;

        // === 阶段 3: 行转换 ===
        let transformer = RowTransformer::new(&self.schema, &job);
        let transformed: Vec<TransformedRow> =
            rows.iter().map(|row| transformer.transform_row(row)).collect();
        let valid_rows = transformed.iter().filter(|r| r.is_ok()).count();
        info!(valid_rows, failed_rows = rows.len() - valid_rows, "行转换完成");

        // === 阶段 4: 事务内预加载已存在记录并写入 ===
        let stamp = SystemStamp {
            at: Utc::now().naive_utc(),
            actor: job.actor.clone(),
            tenant: job.tenant.clone(),
        };
        let row_results = UpsertEngine::new(&self.store, &self.schema, &job).run(transformed, &stamp)?;

        // === 阶段 5: 汇总与错误文件 ===
        let mut summary = self.reporter.summarize(&row_results);
        match self
            .reporter
            .write_report(job.source_name.as_deref(), headers, rows, &row_results)
        {
            Ok(path) => summary.error_report_path = path.map(|p| p.display().to_string()),
            Err(e) => warn!(error = %e, "错误文件写出失败"),
        }
        let detailed_errors = self.reporter.detailed_errors(&row_results);

        info!(
            created = summary.created_count,
            updated = summary.updated_count,
            errors = summary.error_count,
            success_rate = summary.success_rate,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "导入完成"
        );

        Ok(ImportReport {
            job_id: job.job_id,
            summary,
            row_results,
            warnings,
            detailed_errors,
        })
    }

    // 仍未被任何映射覆盖的源值 → UnmappedValues 警告
    fn unmapped_value_issues(
        &self,
        field_mapping: &FieldMapping,
        value_mapping: &ValueMapping,
        unmapped: &BTreeMap<String, Vec<String>>,
    ) -> Vec<ImportIssue> {
        let mut issues = Vec::new();
        for (field_name, values) in unmapped {
            let Some(field) = self.schema.field(field_name) else {
                continue;
            };
            let resolved = value_mapping.get(field_name);
            let remaining: Vec<&str> = values
                .iter()
                .filter(|v| !resolved.is_some_and(|m| m.contains_key(&slugify(v))))
                .map(String::as_str)
                .collect();
            if remaining.is_empty() {
                continue;
            }
            issues.push(ImportIssue::warning(
                IssueKind::UnmappedValues,
                field_name,
                field_mapping.get(field_name).map(String::as_str),
                format!(
                    "{}: 以下取值无法自动映射: {}",
                    field.verbose_name,
                    remaining.join(", ")
                ),
            ));
        }
        issues
    }
}

/// 合并字段映射: 调用方条目优先，已被调用方占用的表头不再自动绑定
pub fn merge_field_mapping(caller: FieldMapping, auto: FieldMapping) -> FieldMapping {
    let mut merged = caller;
    for (field, header) in auto {
        if merged.contains_key(&field) || merged.values().any(|h| *h == header) {
            continue;
        }
        merged.insert(field, header);
    }
    merged
}

/// 合并值映射: 调用方的 slug 条目优先于自动推断
pub fn merge_value_mapping(caller: ValueMapping, auto: ValueMapping) -> ValueMapping {
    let mut merged = auto;
    for (field, entries) in caller {
        merged.entry(field).or_default().extend(entries);
    }
    merged
}
