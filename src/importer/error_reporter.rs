// ==========================================
// 表格批量导入 - 错误报告器
// ==========================================
// 职责: 汇总统计 / 详细错误列表 / 错误文件（原表头 + error 列，仅失败行）
// 文件名: {源文件名}_errors_{YYYYmmdd_HHMMSS}.csv，同秒重名时追加 _1、_2 …
// ==========================================

use crate::domain::record::RawRow;
use crate::domain::report::{DetailedError, ImportSummary, RowResult};
use crate::importer::error::{ImportError, ImportResult};
use anyhow::anyhow;
use chrono::Local;
use csv::WriterBuilder;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// 错误文件追加列名
pub const ERROR_COLUMN: &str = "error";

pub struct ErrorReporter {
    limit: usize,
    output_dir: PathBuf,
}

impl ErrorReporter {
    pub fn new(limit: usize, output_dir: PathBuf) -> Self {
        Self { limit, output_dir }
    }

    pub fn summarize(&self, results: &[RowResult]) -> ImportSummary {
        ImportSummary::from_results(results, self.limit)
    }

    pub fn detailed_errors(&self, results: &[RowResult]) -> Vec<DetailedError> {
        results
            .iter()
            .filter(|r| !r.errors.is_empty())
            .map(|r| DetailedError {
                row_number: r.row_number,
                errors: r.errors.join("; "),
            })
            .collect()
    }

    /// 生成错误文件内容（UTF-8，逗号分隔）
    ///
    /// rows 与 results 按输入顺序一一对应
    pub fn render_csv(
        &self,
        headers: &[String],
        rows: &[RawRow],
        results: &[RowResult],
    ) -> ImportResult<Vec<u8>> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());

        let mut header_record: Vec<&str> = headers.iter().map(String::as_str).collect();
        header_record.push(ERROR_COLUMN);
        writer.write_record(&header_record)?;

        for (row, result) in rows.iter().zip(results) {
            if result.outcome.is_success() {
                continue;
            }
            let mut record: Vec<&str> = headers
                .iter()
                .map(|h| row.get(h).map(String::as_str).unwrap_or(""))
                .collect();
            let message = result.errors.join("; ");
            record.push(&message);
            writer.write_record(&record)?;
        }

        writer
            .into_inner()
            .map_err(|e| ImportError::CsvError(e.to_string()))
    }

    /// 写出错误文件；没有失败行时返回 None
    pub fn write_report(
        &self,
        source_name: Option<&str>,
        headers: &[String],
        rows: &[RawRow],
        results: &[RowResult],
    ) -> ImportResult<Option<PathBuf>> {
        let failed = results.iter().filter(|r| !r.outcome.is_success()).count();
        if failed == 0 {
            return Ok(None);
        }

        let content = self.render_csv(headers, rows, results)?;
        fs::create_dir_all(&self.output_dir)?;

        let path = create_report_file(&self.output_dir, &report_file_stem(source_name), &content)?;

        info!(path = %path.display(), failed_rows = failed, "错误文件已生成");
        Ok(Some(path))
    }
}

// 同秒内最多尝试的重名后缀数
const MAX_NAME_ATTEMPTS: usize = 1000;

fn report_file_stem(source_name: Option<&str>) -> String {
    let base = source_name
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.trim().is_empty())
        .unwrap_or("import");
    format!("{}_errors_{}", base, Local::now().format("%Y%m%d_%H%M%S"))
}

/// 以 create_new 方式写入，不覆盖已有报告
fn create_report_file(dir: &Path, stem: &str, content: &[u8]) -> ImportResult<PathBuf> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{}.csv", stem)
        } else {
            format!("{}_{}.csv", stem, attempt)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(content)?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ImportError::Other(anyhow!(
        "无法在 {} 下生成不重名的错误文件: {}",
        dir.display(),
        stem
    )))
}
