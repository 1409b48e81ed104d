// ==========================================
// 表格批量导入 - 导入历史仓储
// ==========================================
// 职责: import_history 表的写入与查询
// 红线: 只做 CRUD，状态推导在领域层完成
// ==========================================

use crate::db::{init_import_schema, open_sqlite_connection};
use crate::domain::job::{FieldMapping, ImportPolicy};
use crate::domain::report::{ImportHistoryRecord, ImportStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

/// 历史中保留的错误摘要条数
pub const HISTORY_ERROR_SUMMARY_LIMIT: usize = 5;

// ==========================================
// ImportHistoryRepository Trait
// ==========================================
pub trait ImportHistoryRepository: Send + Sync {
    fn insert(&self, record: &ImportHistoryRecord) -> RepositoryResult<()>;

    fn find_by_id(&self, history_id: &str) -> RepositoryResult<Option<ImportHistoryRecord>>;

    /// 最近的导入记录（按 created_at 倒序）
    fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<ImportHistoryRecord>>;
}

// ==========================================
// ImportHistoryRepositoryImpl
// ==========================================
pub struct ImportHistoryRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl ImportHistoryRepositoryImpl {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        init_import_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            init_import_schema(&guard)?;
        }
        Ok(Self { conn })
    }
}

const SELECT_COLUMNS: &str = "history_id, import_name, record_type, source_name, policy, \
     match_fields_json, field_mapping_json, status, total_rows, created_count, updated_count, \
     error_count, success_rate, error_report_path, error_summary_json, duration_ms, actor, \
     tenant, created_at";

fn map_history_row(row: &Row<'_>) -> rusqlite::Result<ImportHistoryRecord> {
    let policy_raw: String = row.get(4)?;
    let match_fields_json: String = row.get(5)?;
    let field_mapping_json: String = row.get(6)?;
    let status_raw: String = row.get(7)?;
    let error_summary_json: String = row.get(14)?;
    let created_at_raw: String = row.get(18)?;

    // JSON 列损坏时按空值处理，不让单条历史阻断列表查询
    let match_fields: Vec<String> = serde_json::from_str(&match_fields_json).unwrap_or_default();
    let field_mapping: FieldMapping = serde_json::from_str(&field_mapping_json).unwrap_or_default();
    let error_summary: Vec<String> = serde_json::from_str(&error_summary_json).unwrap_or_default();

    let created_at = DateTime::parse_from_rfc3339(&created_at_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(18, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ImportHistoryRecord {
        history_id: row.get(0)?,
        import_name: row.get(1)?,
        record_type: row.get(2)?,
        source_name: row.get(3)?,
        policy: ImportPolicy::parse(&policy_raw).unwrap_or_default(),
        match_fields,
        field_mapping,
        status: ImportStatus::parse(&status_raw),
        total_rows: row.get::<_, i64>(8)? as usize,
        created_count: row.get::<_, i64>(9)? as usize,
        updated_count: row.get::<_, i64>(10)? as usize,
        error_count: row.get::<_, i64>(11)? as usize,
        success_rate: row.get(12)?,
        error_report_path: row.get(13)?,
        error_summary,
        duration_ms: row.get::<_, i64>(15)? as u64,
        actor: row.get(16)?,
        tenant: row.get(17)?,
        created_at,
    })
}

impl ImportHistoryRepository for ImportHistoryRepositoryImpl {
    fn insert(&self, record: &ImportHistoryRecord) -> RepositoryResult<()> {
        let error_summary: Vec<&String> = record
            .error_summary
            .iter()
            .take(HISTORY_ERROR_SUMMARY_LIMIT)
            .collect();

        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO import_history (
                history_id, import_name, record_type, source_name, policy,
                match_fields_json, field_mapping_json, status, total_rows,
                created_count, updated_count, error_count, success_rate,
                error_report_path, error_summary_json, duration_ms, actor,
                tenant, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19
            )
            "#,
            params![
                record.history_id,
                record.import_name,
                record.record_type,
                record.source_name,
                record.policy.as_str(),
                serde_json::to_string(&record.match_fields)?,
                serde_json::to_string(&record.field_mapping)?,
                record.status.as_str(),
                record.total_rows as i64,
                record.created_count as i64,
                record.updated_count as i64,
                record.error_count as i64,
                record.success_rate,
                record.error_report_path,
                serde_json::to_string(&error_summary)?,
                record.duration_ms as i64,
                record.actor,
                record.tenant,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn find_by_id(&self, history_id: &str) -> RepositoryResult<Option<ImportHistoryRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let sql = format!(
            "SELECT {} FROM import_history WHERE history_id = ?1",
            SELECT_COLUMNS
        );
        let record = conn
            .query_row(&sql, params![history_id], map_history_row)
            .optional()?;
        Ok(record)
    }

    fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<ImportHistoryRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let sql = format!(
            "SELECT {} FROM import_history ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], map_history_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}
