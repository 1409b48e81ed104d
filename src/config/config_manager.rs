// ==========================================
// 表格批量导入 - 配置管理器
// ==========================================
// 职责: 导入配置加载、查询、写入
// 存储: config_kv 表 (scope_id + key + value)
// ==========================================

use crate::config::import_config_trait::{default_error_report_dir, ImportConfigReader};
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::warn;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_import_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager（与记录仓储共享同一连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
            crate::db::init_import_schema(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 读取并解析比例类配置，超出 (0, 1] 时回退默认值
    fn get_ratio_or_default(&self, key: &str, default: f64) -> Result<f64, Box<dyn Error>> {
        let raw = self.get_config_value(key)?;
        let parsed = raw.as_deref().map(|v| v.trim().parse::<f64>());

        match parsed {
            None => Ok(default),
            Some(Ok(v)) if v > 0.0 && v <= 1.0 => Ok(v),
            Some(_) => {
                warn!(config_key = key, value = ?raw, default, "配置值无效，使用默认值");
                Ok(default)
            }
        }
    }

    fn get_count_or_default(&self, key: &str, default: usize) -> Result<usize, Box<dyn Error>> {
        let value = self.get_config_or_default(key, &default.to_string())?;
        match value.trim().parse::<usize>() {
            Ok(v) if v > 0 => Ok(v),
            _ => {
                warn!(config_key = key, value = %value, default, "配置值无效，使用默认值");
                Ok(default)
            }
        }
    }

    /// 读取 global scope 的配置值（公开方法，供 CLI 复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有 global 配置的快照（JSON 格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn
            .prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

impl ImportConfigReader for ConfigManager {
    fn get_sample_size(&self) -> Result<usize, Box<dyn Error>> {
        self.get_count_or_default(config_keys::SAMPLE_SIZE, 10)
    }

    fn get_header_match_threshold(&self) -> Result<f64, Box<dyn Error>> {
        self.get_ratio_or_default(config_keys::HEADER_MATCH_THRESHOLD, 0.6)
    }

    fn get_value_match_threshold(&self) -> Result<f64, Box<dyn Error>> {
        self.get_ratio_or_default(config_keys::VALUE_MATCH_THRESHOLD, 0.7)
    }

    fn get_text_heuristic_ratio(&self) -> Result<f64, Box<dyn Error>> {
        self.get_ratio_or_default(config_keys::TEXT_HEURISTIC_RATIO, 0.8)
    }

    fn get_summary_error_limit(&self) -> Result<usize, Box<dyn Error>> {
        self.get_count_or_default(config_keys::SUMMARY_ERROR_LIMIT, 5)
    }

    fn get_error_report_dir(&self) -> Result<PathBuf, Box<dyn Error>> {
        Ok(self
            .get_config_value(config_keys::ERROR_REPORT_DIR)?
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_error_report_dir))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 抽样与启发式
    pub const SAMPLE_SIZE: &str = "import.sample_size";
    pub const TEXT_HEURISTIC_RATIO: &str = "import.text_heuristic_ratio";

    // 模糊匹配阈值
    pub const HEADER_MATCH_THRESHOLD: &str = "import.header_match_threshold";
    pub const VALUE_MATCH_THRESHOLD: &str = "import.value_match_threshold";

    // 报告
    pub const SUMMARY_ERROR_LIMIT: &str = "import.summary_error_limit";
    pub const ERROR_REPORT_DIR: &str = "import.error_report_dir";
}
