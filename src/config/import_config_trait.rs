// ==========================================
// 表格批量导入 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管道所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::PathBuf;

// ==========================================
// ImportSettings - 单次任务的配置快照
// ==========================================
// 任务开始前一次性读取，任务内不再访问配置源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub sample_size: usize,
    pub header_match_threshold: f64, // 严格大于
    pub value_match_threshold: f64,  // 大于等于
    pub text_heuristic_ratio: f64,
    pub summary_error_limit: usize,
    pub error_report_dir: PathBuf,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            sample_size: 10,
            header_match_threshold: 0.6,
            value_match_threshold: 0.7,
            text_heuristic_ratio: 0.8,
            summary_error_limit: 5,
            error_report_dir: default_error_report_dir(),
        }
    }
}

/// 默认错误文件目录: <数据目录>/tabular-import/import_errors
pub fn default_error_report_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tabular-import")
        .join("import_errors")
}

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入管道所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
pub trait ImportConfigReader: Send + Sync {
    /// 类型抽样数量（每列最多取多少个不同的非空值）
    ///
    /// # 默认值
    /// - 10
    fn get_sample_size(&self) -> Result<usize, Box<dyn Error>>;

    /// 表头模糊匹配阈值（相似度必须严格大于该值）
    ///
    /// # 默认值
    /// - 0.6
    fn get_header_match_threshold(&self) -> Result<f64, Box<dyn Error>>;

    /// 值模糊匹配阈值（相似度大于等于该值）
    ///
    /// # 默认值
    /// - 0.7
    fn get_value_match_threshold(&self) -> Result<f64, Box<dyn Error>>;

    /// 文本列误判启发式比例
    ///
    /// # 默认值
    /// - 0.8
    fn get_text_heuristic_ratio(&self) -> Result<f64, Box<dyn Error>>;

    /// 汇总中保留的错误条数
    ///
    /// # 默认值
    /// - 5
    fn get_summary_error_limit(&self) -> Result<usize, Box<dyn Error>>;

    /// 错误文件目录
    fn get_error_report_dir(&self) -> Result<PathBuf, Box<dyn Error>>;

    /// 读取完整快照
    fn load_import_settings(&self) -> Result<ImportSettings, Box<dyn Error>> {
        Ok(ImportSettings {
            sample_size: self.get_sample_size()?,
            header_match_threshold: self.get_header_match_threshold()?,
            value_match_threshold: self.get_value_match_threshold()?,
            text_heuristic_ratio: self.get_text_heuristic_ratio()?,
            summary_error_limit: self.get_summary_error_limit()?,
            error_report_dir: self.get_error_report_dir()?,
        })
    }
}
