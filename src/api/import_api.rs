// ==========================================
// 表格批量导入 - 导入 API
// ==========================================
// 职责: 封装文件分析 / 执行导入 / 导入历史
// 约束: 整个任务放到阻塞线程执行；导入总是返回汇总并写入历史
// 约束: 同一 ImportApi 上的导入任务串行执行（共享一个事务连接）
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, ImportConfigReader, ImportSettings};
use crate::db::{init_import_schema, open_sqlite_connection};
use crate::domain::job::{FieldMapping, ImportJobSpec};
use crate::domain::report::{
    DetailedError, ImportHistoryRecord, ImportIssue, ImportStatus, ImportSummary, MappingPreview,
};
use crate::domain::schema::RecordSchema;
use crate::importer::error::ImportError;
use crate::importer::import_pipeline::merge_field_mapping;
use crate::importer::{CsvSource, HeaderMapper, HeaderMapperImpl, ImportPipeline};
use crate::repository::{ImportHistoryRepository, ImportHistoryRepositoryImpl, SqliteRecordStore};
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// 导入API响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportFileResponse {
    /// 导入历史ID
    pub history_id: String,
    /// 任务ID
    pub job_id: String,
    pub status: ImportStatus,
    pub summary: ImportSummary,
    /// 预检问题（成功时为警告，结构错误时为致命问题）
    pub issues: Vec<ImportIssue>,
    /// 每个失败行的完整错误
    pub detailed_errors: Vec<DetailedError>,
    /// 导入耗时（毫秒）
    pub duration_ms: u64,
}

/// 导入API
pub struct ImportApi {
    conn: Arc<Mutex<Connection>>,
    schema: RecordSchema,
    // 共享连接上同一时刻只允许一个导入事务
    job_lock: AsyncMutex<()>,
}

impl ImportApi {
    /// 创建新的ImportApi实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径（目标表、配置与导入历史共用）
    /// - schema: 目标记录结构
    pub fn new(db_path: &str, schema: RecordSchema) -> ApiResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        init_import_schema(&conn).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            schema,
            job_lock: AsyncMutex::new(()),
        })
    }

    /// 从已有连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>, schema: RecordSchema) -> ApiResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
            init_import_schema(&guard).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        }
        Ok(Self {
            conn,
            schema,
            job_lock: AsyncMutex::new(()),
        })
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// 分析文件: 自动映射 + 预检，不写库
    #[instrument(skip(self))]
    pub async fn analyze_file(&self, file_path: &str) -> ApiResult<MappingPreview> {
        let conn = Arc::clone(&self.conn);
        let schema = self.schema.clone();
        let path = PathBuf::from(file_path);

        tokio::task::spawn_blocking(move || -> ApiResult<MappingPreview> {
            let data = CsvSource::read_path(&path)?;
            let settings = load_settings(&conn)?;
            let pipeline =
                ImportPipeline::new(SqliteRecordStore::from_connection(conn), schema, settings);
            Ok(pipeline.analyze(&data.headers, &data.rows)?)
        })
        .await
        .map_err(|e| ApiError::InternalError(format!("分析任务执行失败: {}", e)))?
    }

    /// 执行导入
    ///
    /// # 参数
    /// - file_path: CSV 文件路径
    /// - spec: 任务描述
    /// - auto_map: 是否用自动推断补全字段映射（调用方条目优先）
    ///
    /// # 返回
    /// - Ok(ImportFileResponse): 结构错误/系统错误时状态为 Failed，计数为 0
    /// - Err(ApiError): 文件无法读取或配置无法加载
    #[instrument(skip(self, spec))]
    pub async fn import_file(
        &self,
        file_path: &str,
        spec: ImportJobSpec,
        auto_map: bool,
    ) -> ApiResult<ImportFileResponse> {
        let conn = Arc::clone(&self.conn);
        let schema = self.schema.clone();
        let path = PathBuf::from(file_path);

        let _job_guard = self.job_lock.lock().await;
        tokio::task::spawn_blocking(move || import_blocking(conn, schema, &path, spec, auto_map))
            .await
            .map_err(|e| ApiError::InternalError(format!("导入任务执行失败: {}", e)))?
    }

    /// 最近的导入历史（按时间倒序）
    pub async fn recent_history(&self, limit: usize) -> ApiResult<Vec<ImportHistoryRecord>> {
        let limit = limit.clamp(1, 100);
        let repo = ImportHistoryRepositoryImpl::from_connection(Arc::clone(&self.conn))?;
        Ok(repo.list_recent(limit)?)
    }

    /// 按ID查询导入历史
    pub async fn get_history(&self, history_id: &str) -> ApiResult<ImportHistoryRecord> {
        let repo = ImportHistoryRepositoryImpl::from_connection(Arc::clone(&self.conn))?;
        repo.find_by_id(history_id)?
            .ok_or_else(|| ApiError::NotFound(format!("导入历史(id={})不存在", history_id)))
    }
}

fn load_settings(conn: &Arc<Mutex<Connection>>) -> ApiResult<ImportSettings> {
    ConfigManager::from_connection(Arc::clone(conn))
        .and_then(|manager| manager.load_import_settings())
        .map_err(|e| ApiError::ConfigError(e.to_string()))
}

fn import_blocking(
    conn: Arc<Mutex<Connection>>,
    schema: RecordSchema,
    path: &Path,
    spec: ImportJobSpec,
    auto_map: bool,
) -> ApiResult<ImportFileResponse> {
    let started = Instant::now();
    let data = CsvSource::read_path(path)?;
    let settings = load_settings(&conn)?;

    let source_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string);
    let import_name = if spec.import_name.trim().is_empty() {
        schema.record_type.clone()
    } else {
        spec.import_name.clone()
    };
    let policy = spec.policy;
    let match_fields = spec.match_fields.clone();
    let actor = spec.actor.clone();
    let tenant = spec.tenant.clone();
    let record_type = schema.record_type.clone();

    let pipeline = ImportPipeline::new(
        SqliteRecordStore::from_connection(Arc::clone(&conn)),
        schema,
        settings,
    );

    let (job_id, field_mapping, result) = match spec.into_job(source_name.as_deref()) {
        Ok(mut job) => {
            if auto_map {
                let auto = HeaderMapperImpl::new(pipeline.settings().header_match_threshold)
                    .map_headers(&data.headers, pipeline.schema());
                job.field_mapping = merge_field_mapping(job.field_mapping, auto);
            }
            let job_id = job.job_id.clone();
            let field_mapping = job.field_mapping.clone();
            (job_id, field_mapping, pipeline.run(job, &data.headers, &data.rows))
        }
        Err(e) => (Uuid::new_v4().to_string(), FieldMapping::new(), Err(e)),
    };

    let (summary, issues, detailed_errors) = match result {
        Ok(report) => (report.summary, report.warnings, report.detailed_errors),
        Err(e) => {
            let issues = match &e {
                ImportError::Schema(issues) => issues.clone(),
                _ => Vec::new(),
            };
            if e.is_schema_error() {
                warn!(job_id = %job_id, error = %e, "导入任务未通过预检");
            } else {
                error!(job_id = %job_id, error = %e, "导入任务失败");
            }
            (
                ImportSummary::failed(data.rows.len(), e.to_string()),
                issues,
                Vec::new(),
            )
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    let history = ImportHistoryRecord {
        history_id: Uuid::new_v4().to_string(),
        import_name,
        record_type,
        source_name,
        policy,
        match_fields,
        field_mapping,
        status: summary.status,
        total_rows: summary.total_rows,
        created_count: summary.created_count,
        updated_count: summary.updated_count,
        error_count: summary.error_count,
        success_rate: summary.success_rate,
        error_report_path: summary.error_report_path.clone(),
        error_summary: summary.errors.clone(),
        duration_ms,
        actor,
        tenant,
        created_at: Utc::now(),
    };

    match ImportHistoryRepositoryImpl::from_connection(conn).and_then(|repo| repo.insert(&history)) {
        Ok(()) => info!(history_id = %history.history_id, status = history.status.as_str(), "导入历史已记录"),
        Err(e) => error!(error = %e, "导入历史写入失败"),
    }

    Ok(ImportFileResponse {
        history_id: history.history_id,
        job_id,
        status: summary.status,
        summary,
        issues,
        detailed_errors,
        duration_ms,
    })
}
