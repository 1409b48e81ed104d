// ==========================================
// 表格批量导入 - CSV 数据源
// ==========================================
// 职责: 读取 CSV 文件 → 表头列表 + 原始行
// 说明: 管道本身不解析文件，本模块只供 CLI / 门面层使用
// ==========================================

use crate::domain::record::RawRow;
use crate::importer::error::{ImportError, ImportResult};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// 已读取的表格数据
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularData {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

pub struct CsvSource;

impl CsvSource {
    pub fn read_path(path: &Path) -> ImportResult<TabularData> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        let file = File::open(path)?;
        let data = Self::read(file)?;
        debug!(
            path = %path.display(),
            headers = data.headers.len(),
            rows = data.rows.len(),
            "CSV 读取完成"
        );
        Ok(data)
    }

    pub fn read<R: Read>(input: R) -> ImportResult<TabularData> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(input);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let mut row = RawRow::with_capacity(headers.len());
            for (idx, value) in record.iter().enumerate() {
                if let Some(header) = headers.get(idx) {
                    row.insert(header.clone(), value.to_string());
                }
            }

            // 跳过完全空白的行
            if row.values().all(|v| v.trim().is_empty()) {
                continue;
            }
            rows.push(row);
        }

        Ok(TabularData { headers, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_skips_blank_rows_and_bom() {
        let input = "\u{feff}External ID,Name\nE1,Ann\n,\nE2,Bob\n";
        let data = CsvSource::read(input.as_bytes()).unwrap();

        assert_eq!(data.headers, vec!["External ID", "Name"]);
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.rows[1]["Name"], "Bob");
    }

    #[test]
    fn test_short_rows_are_allowed() {
        let data = CsvSource::read("a,b,c\n1,2\n".as_bytes()).unwrap();
        assert_eq!(data.rows[0].get("c"), None);
        assert_eq!(data.rows[0]["b"], "2");
    }

    #[test]
    fn test_missing_file() {
        let err = CsvSource::read_path(Path::new("/nonexistent/file.csv")).unwrap_err();
        assert!(matches!(err, ImportError::FileNotFound(_)));
    }
}
