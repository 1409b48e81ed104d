// ==========================================
// 错误文件集成测试
// ==========================================
// 测试目标: 错误文件可被重新读取，修正后再次导入即可补齐失败行
// ==========================================


use std::fs;
use tabular_import::domain::{ImportJob, ImportPolicy, ImportStatus, RowOutcome};
use tabular_import::importer::error_reporter::ERROR_COLUMN;
use tabular_import::importer::{CsvSource, ImportPipeline};
use tabular_import::logging;
use tempfile::TempDir;
use test_helpers::{
    create_test_db, map_member_fields, member_headers, member_row, members_schema, test_settings,
    test_store,
};

#[test]
fn test_error_file_round_trip() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = ImportPipeline::new(
        test_store(&db_path),
        members_schema(),
        test_settings(error_dir.path()),
    );

    let rows = vec![
        member_row(["E1", "Ann", "", "2024-01-15", "", ""]),
        member_row(["E2", "Bob, Jr.", "", "31/31/2024", "", ""]),
        member_row(["E3", "", "", "", "", ""]),
    ];
    let job = map_member_fields(ImportJob::builder(ImportPolicy::Upsert))
        .match_fields(&["external_id"])
        .source_name("members.csv")
        .build()
        .unwrap();
    let report = pipeline.run(job, &member_headers(), &rows).unwrap();
    assert_eq!(report.summary.error_count, 2);

    // 错误文件: 原表头顺序 + error 列，仅失败行
    let path = report
        .summary
        .error_report_path
        .clone()
        .expect("应生成错误文件");
    let file_name = std::path::Path::new(&path)
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    assert!(file_name.starts_with("members_errors_"));

    let data = CsvSource::read_path(std::path::Path::new(&path)).unwrap();
    let mut expected_headers = member_headers();
    expected_headers.push(ERROR_COLUMN.to_string());
    assert_eq!(data.headers, expected_headers);
    assert_eq!(data.rows.len(), 2);
    assert_eq!(data.rows[0]["External ID"], "E2");
    assert_eq!(data.rows[0]["First Name"], "Bob, Jr.");
    assert_eq!(data.rows[0][ERROR_COLUMN], report.row_results[1].errors.join("; "));
    assert_eq!(data.rows[1]["External ID"], "E3");

    // 修正错误后重新导入同一文件
    let mut fixed = data.rows.clone();
    fixed[0].insert("Join Date".to_string(), "2024-02-01".to_string());
    fixed[1].insert("First Name".to_string(), "Cid".to_string());

    let retry = map_member_fields(ImportJob::builder(ImportPolicy::Upsert))
        .match_fields(&["external_id"])
        .build()
        .unwrap();
    let retry_report = pipeline.run(retry, &data.headers, &fixed).unwrap();

    assert_eq!(retry_report.summary.status, ImportStatus::Success);
    assert!(retry_report
        .row_results
        .iter()
        .all(|r| r.outcome == RowOutcome::Created));
    assert!(retry_report.summary.error_report_path.is_none());
    assert_eq!(pipeline.store().count(pipeline.schema()).unwrap(), 3);
}

#[test]
fn test_error_file_written_under_configured_directory() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let nested = error_dir.path().join("reports").join("errors");
    let pipeline = ImportPipeline::new(test_store(&db_path), members_schema(), test_settings(&nested));

    let job = map_member_fields(ImportJob::builder(ImportPolicy::CreateOnly))
        .build()
        .unwrap();
    let report = pipeline
        .run(job, &member_headers(), &[member_row(["", "Ann", "", "", "", ""])])
        .unwrap();

    assert_eq!(report.summary.status, ImportStatus::Failed);
    let path = report.summary.error_report_path.unwrap();
    assert!(path.starts_with(&nested.to_string_lossy().into_owned()));
    // 未提供源文件名时使用默认前缀
    assert!(path.contains("import_errors_"));
    assert!(!fs::read_to_string(&path).unwrap().is_empty());
}
