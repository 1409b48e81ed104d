// ==========================================
// 表格批量导入 - 记录存储 SQLite 实现
// ==========================================
// 表结构: id + 结构描述中的字段 + created_at / updated_at / created_by / updated_by / tenant_id
// 约束: 所有标识符先校验再加双引号，所有取值参数化绑定
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::record::{FieldValue, RecordAttributes, StoredRecord, SystemStamp};
use crate::domain::schema::{FieldKind, RecordSchema, SchemaField};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_store::{BatchCapabilities, RecordStore};
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, Row};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("标识符正则无效"));

const RESERVED_COLUMNS: [&str; 6] = [
    "id",
    "created_at",
    "updated_at",
    "created_by",
    "updated_by",
    "tenant_id",
];

const DATE_FMT: &str = "%Y-%m-%d";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ==========================================
// FieldValue → SQLite 绑定值
// ==========================================
impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            FieldValue::Null => Value::Null,
            FieldValue::Text(s) => Value::Text(s.clone()),
            FieldValue::Integer(n) | FieldValue::Reference(n) => Value::Integer(*n),
            FieldValue::Decimal(d) => Value::Real(*d),
            FieldValue::Boolean(b) => Value::Integer(i64::from(*b)),
            FieldValue::Date(d) => Value::Text(d.format(DATE_FMT).to_string()),
            FieldValue::DateTime(dt) => Value::Text(dt.format(DATETIME_FMT).to_string()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

/// 按字段类型读取列值
fn read_field_value(row: &Row<'_>, idx: usize, field: &SchemaField) -> rusqlite::Result<FieldValue> {
    let raw = row.get_ref(idx)?;
    if let ValueRef::Null = raw {
        return Ok(FieldValue::Null);
    }

    let value = match field.kind {
        FieldKind::Integer => FieldValue::Integer(row.get::<_, i64>(idx)?),
        FieldKind::Reference => FieldValue::Reference(row.get::<_, i64>(idx)?),
        FieldKind::Decimal => FieldValue::Decimal(row.get::<_, f64>(idx)?),
        FieldKind::Boolean => FieldValue::Boolean(row.get::<_, i64>(idx)? != 0),
        FieldKind::Date => {
            let text: String = row.get(idx)?;
            NaiveDate::parse_from_str(&text, DATE_FMT)
                .map(FieldValue::Date)
                .unwrap_or(FieldValue::Text(text))
        }
        FieldKind::DateTime => {
            let text: String = row.get(idx)?;
            NaiveDateTime::parse_from_str(&text, DATETIME_FMT)
                .map(FieldValue::DateTime)
                .unwrap_or(FieldValue::Text(text))
        }
        FieldKind::Text | FieldKind::Email | FieldKind::Url | FieldKind::Choice => {
            FieldValue::Text(row.get::<_, String>(idx)?)
        }
    };
    Ok(value)
}

/// 校验并加引号
fn quote_ident(name: &str) -> RepositoryResult<String> {
    if IDENT_RE.is_match(name) {
        Ok(format!("\"{}\"", name))
    } else {
        Err(RepositoryError::InvalidIdentifier(name.to_string()))
    }
}

// ==========================================
// SqliteRecordStore
// ==========================================
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（与配置/历史仓储共享同一连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取全部记录（按 id 升序）
    pub fn fetch_all(&self, schema: &RecordSchema) -> RepositoryResult<Vec<StoredRecord>> {
        let sql = format!("{} ORDER BY \"id\"", select_clause(schema)?);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| map_stored_record(row, schema))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// 记录数
    pub fn count(&self, schema: &RecordSchema) -> RepositoryResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&schema.record_type)?);
        let conn = self.lock()?;
        let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// 读取单条记录的系统字段 (created_by, updated_by, tenant_id)
    pub fn fetch_stamp(
        &self,
        schema: &RecordSchema,
        id: i64,
    ) -> RepositoryResult<(Option<String>, Option<String>, Option<String>)> {
        let sql = format!(
            "SELECT \"created_by\", \"updated_by\", \"tenant_id\" FROM {} WHERE \"id\" = ?1",
            quote_ident(&schema.record_type)?
        );
        let conn = self.lock()?;
        let stamp = conn.query_row(&sql, [id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        Ok(stamp)
    }
}

fn select_clause(schema: &RecordSchema) -> RepositoryResult<String> {
    let mut columns = vec!["\"id\"".to_string()];
    for field in &schema.fields {
        columns.push(quote_ident(&field.name)?);
    }
    Ok(format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        quote_ident(&schema.record_type)?
    ))
}

fn map_stored_record(row: &Row<'_>, schema: &RecordSchema) -> rusqlite::Result<StoredRecord> {
    let id: i64 = row.get(0)?;
    let mut attributes = RecordAttributes::new();
    for (i, field) in schema.fields.iter().enumerate() {
        attributes.insert(field.name.clone(), read_field_value(row, i + 1, field)?);
    }
    Ok(StoredRecord { id, attributes })
}

impl RecordStore for SqliteRecordStore {
    fn capabilities(&self) -> BatchCapabilities {
        BatchCapabilities::sqlite()
    }

    fn ensure_table(&self, schema: &RecordSchema) -> RepositoryResult<()> {
        let mut columns = vec!["\"id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        for field in &schema.fields {
            if RESERVED_COLUMNS.contains(&field.name.as_str()) {
                return Err(RepositoryError::InvalidIdentifier(format!(
                    "{} 与系统字段冲突",
                    field.name
                )));
            }
            columns.push(format!(
                "{} {}",
                quote_ident(&field.name)?,
                field.kind.sql_type()
            ));
        }
        columns.push("\"created_at\" TEXT NOT NULL".to_string());
        columns.push("\"updated_at\" TEXT NOT NULL".to_string());
        columns.push("\"created_by\" TEXT".to_string());
        columns.push("\"updated_by\" TEXT".to_string());
        columns.push("\"tenant_id\" TEXT".to_string());

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&schema.record_type)?,
            columns.join(", ")
        );
        let conn = self.lock()?;
        conn.execute_batch(&sql)?;
        Ok(())
    }

    fn begin(&self) -> RepositoryResult<()> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }

    fn commit(&self) -> RepositoryResult<()> {
        let conn = self.lock()?;
        conn.execute_batch("COMMIT")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }

    fn rollback(&self) -> RepositoryResult<()> {
        let conn = self.lock()?;
        if conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch("ROLLBACK")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }

    fn find_by_match_fields(
        &self,
        schema: &RecordSchema,
        match_fields: &[String],
        key_values: &[Vec<FieldValue>],
    ) -> RepositoryResult<Vec<StoredRecord>> {
        if match_fields.is_empty() || key_values.is_empty() {
            return Ok(Vec::new());
        }

        let quoted = match_fields
            .iter()
            .map(|f| quote_ident(f))
            .collect::<RepositoryResult<Vec<_>>>()?;

        let mut placeholder = 0;
        let clauses = key_values
            .iter()
            .map(|_| {
                let parts = quoted
                    .iter()
                    .map(|col| {
                        placeholder += 1;
                        format!("{} = ?{}", col, placeholder)
                    })
                    .collect::<Vec<_>>();
                format!("({})", parts.join(" AND "))
            })
            .collect::<Vec<_>>();

        let sql = format!(
            "{} WHERE {} ORDER BY \"id\"",
            select_clause(schema)?,
            clauses.join(" OR ")
        );
        debug!(
            record_type = %schema.record_type,
            keys = key_values.len(),
            "按匹配字段预加载记录"
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(key_values.iter().flatten()), |row| {
            map_stored_record(row, schema)
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn bulk_create(
        &self,
        schema: &RecordSchema,
        records: &[RecordAttributes],
        stamp: &SystemStamp,
    ) -> RepositoryResult<Vec<i64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut columns = Vec::with_capacity(schema.fields.len() + 5);
        for field in &schema.fields {
            columns.push(quote_ident(&field.name)?);
        }
        for sys in ["created_at", "updated_at", "created_by", "updated_by", "tenant_id"] {
            columns.push(format!("\"{}\"", sys));
        }
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&schema.record_type)?,
            columns.join(", "),
            placeholders.join(", ")
        );

        let at = FieldValue::DateTime(stamp.at);
        let actor = text_or_null(&stamp.actor);
        let tenant = text_or_null(&stamp.tenant);

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut ids = Vec::with_capacity(records.len());

        for record in records {
            let mut values: Vec<FieldValue> = schema
                .fields
                .iter()
                .map(|f| record.get(&f.name).cloned().unwrap_or(FieldValue::Null))
                .collect();
            values.extend([
                at.clone(),
                at.clone(),
                actor.clone(),
                actor.clone(),
                tenant.clone(),
            ]);
            stmt.execute(params_from_iter(values.iter()))?;
            ids.push(conn.last_insert_rowid());
        }

        Ok(ids)
    }

    fn bulk_update(
        &self,
        schema: &RecordSchema,
        fields: &[String],
        updates: &[(i64, RecordAttributes)],
        stamp: &SystemStamp,
    ) -> RepositoryResult<usize> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut assignments = Vec::with_capacity(fields.len() + 3);
        for (i, field) in fields.iter().enumerate() {
            if schema.field(field).is_none() {
                return Err(RepositoryError::FieldValueError {
                    field: field.clone(),
                    message: "字段不在结构描述中".to_string(),
                });
            }
            assignments.push(format!("{} = ?{}", quote_ident(field)?, i + 1));
        }
        let base = fields.len();
        assignments.push(format!("\"updated_at\" = ?{}", base + 1));
        assignments.push(format!("\"updated_by\" = ?{}", base + 2));
        assignments.push(format!("\"tenant_id\" = ?{}", base + 3));

        let sql = format!(
            "UPDATE {} SET {} WHERE \"id\" = ?{}",
            quote_ident(&schema.record_type)?,
            assignments.join(", "),
            base + 4
        );

        let at = FieldValue::DateTime(stamp.at);
        let actor = text_or_null(&stamp.actor);
        let tenant = text_or_null(&stamp.tenant);

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut count = 0;

        for (id, attributes) in updates {
            let mut values: Vec<FieldValue> = fields
                .iter()
                .map(|f| attributes.get(f).cloned().unwrap_or(FieldValue::Null))
                .collect();
            values.extend([
                at.clone(),
                actor.clone(),
                tenant.clone(),
                FieldValue::Integer(*id),
            ]);
            count += stmt.execute(params_from_iter(values.iter()))?;
        }

        Ok(count)
    }
}

fn text_or_null(value: &Option<String>) -> FieldValue {
    value
        .as_ref()
        .map(|s| FieldValue::Text(s.clone()))
        .unwrap_or(FieldValue::Null)
}
