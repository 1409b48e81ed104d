// ==========================================
// ImportPipeline 集成测试
// ==========================================
// 测试目标: 验证 映射 → 预检 → 转换 → 匹配 → 写入 → 报告 的完整流程
// ==========================================


use tabular_import::domain::{
    FieldValue, ImportJob, ImportPolicy, ImportStatus, IssueKind, RowOutcome,
};
use tabular_import::importer::{ImportError, ImportPipeline};
use tabular_import::logging;
use tabular_import::repository::{RecordStore, SqliteRecordStore};
use tempfile::TempDir;
use test_helpers::{
    create_test_db, map_member_fields, member_headers, member_row, members_schema, test_settings,
    test_store, three_valid_rows,
};

fn create_pipeline(db_path: &str, error_dir: &TempDir) -> ImportPipeline<SqliteRecordStore> {
    ImportPipeline::new(
        test_store(db_path),
        members_schema(),
        test_settings(error_dir.path()),
    )
}

fn upsert_job() -> ImportJob {
    map_member_fields(ImportJob::builder(ImportPolicy::Upsert))
        .match_fields(&["external_id"])
        .source_name("members.csv")
        .build()
        .expect("构建任务失败")
}

#[test]
fn test_scenario_a_create_only_all_rows() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = create_pipeline(&db_path, &error_dir);

    let job = map_member_fields(ImportJob::builder(ImportPolicy::CreateOnly))
        .build()
        .unwrap();
    let report = pipeline
        .run(job, &member_headers(), &three_valid_rows())
        .expect("导入应成功");

    let summary = &report.summary;
    assert_eq!(summary.total_rows, 3);
    assert_eq!(summary.created_count, 3);
    assert_eq!(summary.error_count, 0);
    assert_eq!(summary.success_rate, 100.0);
    assert_eq!(summary.status, ImportStatus::Success);
    assert!(summary.error_report_path.is_none());

    let records = pipeline.store().fetch_all(pipeline.schema()).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(
        records[0].attributes["active"],
        FieldValue::Text("yes".to_string())
    );
    assert_eq!(records[1].attributes["department"], FieldValue::Reference(20));
    assert_eq!(records[2].attributes["department"], FieldValue::Reference(20));
    assert_eq!(records[2].attributes["email"], FieldValue::Null);
}

#[test]
fn test_scenario_b_invalid_date_fails_only_that_row() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = create_pipeline(&db_path, &error_dir);

    let rows = vec![
        member_row(["E1", "Ann", "", "2024-01-15", "", ""]),
        member_row(["E2", "Bob", "", "31/31/2024", "", ""]),
        member_row(["E3", "Cid", "", "03/04/2024", "", ""]),
    ];
    let report = pipeline
        .run(upsert_job(), &member_headers(), &rows)
        .expect("类型抽样不符只产生警告");

    assert!(report
        .warnings
        .iter()
        .any(|w| w.kind == IssueKind::TypeMismatch && w.field == "joined_on"));

    let failed = &report.row_results[1];
    assert_eq!(failed.outcome, RowOutcome::Failed);
    assert_eq!(failed.errors.len(), 1);
    assert!(failed.errors[0].contains("Join Date"));
    assert!(failed.errors[0].contains("31/31/2024"));

    assert_eq!(report.summary.created_count, 2);
    assert_eq!(report.summary.status, ImportStatus::Partial);
    assert_eq!(report.summary.errors[0], format!("Row 2: {}", failed.errors[0]));

    // 默认 MonthFirst: 03/04/2024 → 3 月 4 日
    let records = pipeline.store().fetch_all(pipeline.schema()).unwrap();
    assert_eq!(
        records[1].attributes["joined_on"].to_string(),
        "2024-03-04"
    );
}

#[test]
fn test_scenario_c_duplicate_key_in_file_upsert() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = create_pipeline(&db_path, &error_dir);

    let rows = vec![
        member_row(["E1", "Ann", "", "", "", ""]),
        member_row(["E1", "Anna", "", "", "", ""]),
    ];
    let report = pipeline.run(upsert_job(), &member_headers(), &rows).unwrap();

    let outcomes: Vec<RowOutcome> = report.row_results.iter().map(|r| r.outcome).collect();
    assert_eq!(outcomes, vec![RowOutcome::Created, RowOutcome::Updated]);
    assert_eq!(report.summary.created_count, 1);
    assert_eq!(report.summary.updated_count, 1);

    let records = pipeline.store().fetch_all(pipeline.schema()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].attributes["first_name"],
        FieldValue::Text("Anna".to_string())
    );
}

#[test]
fn test_scenario_d_fuzzy_choice_and_unmapped_value() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = create_pipeline(&db_path, &error_dir);

    let rows = vec![
        member_row(["E1", "Ann", "", "", "Y", ""]),
        member_row(["E2", "Bob", "", "", "Q", ""]),
    ];
    let report = pipeline.run(upsert_job(), &member_headers(), &rows).unwrap();

    assert_eq!(report.row_results[0].outcome, RowOutcome::Created);
    assert_eq!(report.row_results[1].outcome, RowOutcome::Failed);
    assert!(report.row_results[1].errors[0].contains("'Q'"));

    let unmapped = report
        .warnings
        .iter()
        .find(|w| w.kind == IssueKind::UnmappedValues)
        .expect("应提示无法映射的取值");
    assert_eq!(unmapped.field, "active");
    assert!(unmapped.message.contains('Q'));

    let records = pipeline.store().fetch_all(pipeline.schema()).unwrap();
    assert_eq!(
        records[0].attributes["active"],
        FieldValue::Text("yes".to_string())
    );
}

#[test]
fn test_caller_value_mapping_wins_over_auto_mapping() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = create_pipeline(&db_path, &error_dir);

    let job = map_member_fields(ImportJob::builder(ImportPolicy::CreateOnly))
        .map_value("active", "y", "no")
        .map_value("active", "q", "yes")
        .build()
        .unwrap();
    let rows = vec![
        member_row(["E1", "Ann", "", "", "Y", ""]),
        member_row(["E2", "Bob", "", "", "Q", ""]),
    ];
    let report = pipeline.run(job, &member_headers(), &rows).unwrap();

    assert_eq!(report.summary.created_count, 2);
    assert!(report
        .warnings
        .iter()
        .all(|w| w.kind != IssueKind::UnmappedValues));

    let records = pipeline.store().fetch_all(pipeline.schema()).unwrap();
    assert_eq!(records[0].attributes["active"], FieldValue::Text("no".to_string()));
    assert_eq!(records[1].attributes["active"], FieldValue::Text("yes".to_string()));
}

#[test]
fn test_required_field_unmapped_aborts_before_any_row() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = create_pipeline(&db_path, &error_dir);

    let job = ImportJob::builder(ImportPolicy::CreateOnly)
        .map_field("external_id", "External ID")
        .build()
        .unwrap();
    let err = pipeline
        .run(job, &member_headers(), &three_valid_rows())
        .unwrap_err();

    match err {
        ImportError::Schema(issues) => {
            assert!(issues
                .iter()
                .any(|i| i.kind == IssueKind::RequiredUnmapped && i.field == "first_name"));
            assert!(issues.iter().all(|i| i.is_fatal()));
        }
        other => panic!("期望结构错误，实际: {:?}", other),
    }

    pipeline.store().ensure_table(pipeline.schema()).unwrap();
    assert_eq!(pipeline.store().count(pipeline.schema()).unwrap(), 0);
}

#[test]
fn test_required_field_covered_by_replace_value() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = create_pipeline(&db_path, &error_dir);

    let job = ImportJob::builder(ImportPolicy::CreateOnly)
        .map_field("external_id", "External ID")
        .map_field("active", "Active")
        .replace_value("first_name", "Unknown")
        .replace_value("active", "no")
        .build()
        .unwrap();
    let rows = vec![
        member_row(["E1", "Ann", "", "", "", ""]),
        member_row(["E2", "Bob", "", "", "yes", ""]),
    ];
    let report = pipeline.run(job, &member_headers(), &rows).unwrap();
    assert_eq!(report.summary.created_count, 2);

    let records = pipeline.store().fetch_all(pipeline.schema()).unwrap();
    assert_eq!(
        records[0].attributes["first_name"],
        FieldValue::Text("Unknown".to_string())
    );
    assert_eq!(records[0].attributes["active"], FieldValue::Text("no".to_string()));
    assert_eq!(records[1].attributes["active"], FieldValue::Text("yes".to_string()));
}

#[test]
fn test_strict_type_validation_makes_mismatch_fatal() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = create_pipeline(&db_path, &error_dir);

    let job = map_member_fields(ImportJob::builder(ImportPolicy::CreateOnly))
        .strict_type_validation(true)
        .build()
        .unwrap();
    let rows = vec![member_row(["E1", "Ann", "not-an-email", "", "", ""])];

    let err = pipeline.run(job, &member_headers(), &rows).unwrap_err();
    match err {
        ImportError::Schema(issues) => {
            assert!(issues
                .iter()
                .any(|i| i.kind == IssueKind::TypeMismatch && i.field == "email"));
        }
        other => panic!("期望结构错误，实际: {:?}", other),
    }
}

#[test]
fn test_update_only_reports_missing_records() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = create_pipeline(&db_path, &error_dir);

    // 先建一条
    let seed = map_member_fields(ImportJob::builder(ImportPolicy::CreateOnly))
        .build()
        .unwrap();
    pipeline
        .run(
            seed,
            &member_headers(),
            &[member_row(["E1", "Ann", "", "", "", ""])],
        )
        .unwrap();

    let job = map_member_fields(ImportJob::builder(ImportPolicy::UpdateOnly))
        .match_fields(&["external_id"])
        .actor("alice")
        .tenant("t-1")
        .build()
        .unwrap();
    let rows = vec![
        member_row(["E1", "Annie", "", "", "", ""]),
        member_row(["E2", "Bob", "", "", "", ""]),
    ];
    let report = pipeline.run(job, &member_headers(), &rows).unwrap();

    assert_eq!(report.row_results[0].outcome, RowOutcome::Updated);
    assert_eq!(report.row_results[1].outcome, RowOutcome::SkippedMissing);
    assert_eq!(
        report.row_results[1].errors,
        vec!["未找到匹配记录: external_id='E2'".to_string()]
    );
    assert_eq!(report.summary.status, ImportStatus::Partial);
    assert_eq!(report.summary.success_rate, 50.0);

    let store = pipeline.store();
    let records = store.fetch_all(pipeline.schema()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].attributes["first_name"],
        FieldValue::Text("Annie".to_string())
    );
    let (_, updated_by, tenant) = store.fetch_stamp(pipeline.schema(), records[0].id).unwrap();
    assert_eq!(updated_by.as_deref(), Some("alice"));
    assert_eq!(tenant.as_deref(), Some("t-1"));
}

#[test]
fn test_create_only_rejects_existing_match() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = create_pipeline(&db_path, &error_dir);

    pipeline
        .run(upsert_job(), &member_headers(), &three_valid_rows())
        .unwrap();

    let job = map_member_fields(ImportJob::builder(ImportPolicy::CreateOnly))
        .match_fields(&["external_id"])
        .build()
        .unwrap();
    let rows = vec![
        member_row(["E1", "Ann", "", "", "", ""]),
        member_row(["E4", "Dee", "", "", "", ""]),
    ];
    let report = pipeline.run(job, &member_headers(), &rows).unwrap();

    assert_eq!(report.row_results[0].outcome, RowOutcome::SkippedExisting);
    assert_eq!(
        report.row_results[0].errors,
        vec!["记录已存在: external_id='E1'".to_string()]
    );
    assert_eq!(report.row_results[1].outcome, RowOutcome::Created);
    assert_eq!(pipeline.store().count(pipeline.schema()).unwrap(), 4);
}

#[test]
fn test_upsert_is_idempotent() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = create_pipeline(&db_path, &error_dir);
    let rows = three_valid_rows();

    let first = pipeline.run(upsert_job(), &member_headers(), &rows).unwrap();
    assert_eq!(first.summary.created_count, 3);
    let after_first = pipeline.store().fetch_all(pipeline.schema()).unwrap();

    let second = pipeline.run(upsert_job(), &member_headers(), &rows).unwrap();
    assert_eq!(second.summary.created_count, 0);
    assert_eq!(second.summary.updated_count, 3);
    assert_eq!(second.summary.status, ImportStatus::Success);

    let after_second = pipeline.store().fetch_all(pipeline.schema()).unwrap();
    assert_eq!(after_first, after_second);
}

#[test]
fn test_outcome_counts_are_consistent() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = create_pipeline(&db_path, &error_dir);

    let rows = vec![
        member_row(["E1", "Ann", "ann@example.com", "2024-01-15", "Yes", "Sales"]),
        member_row(["E2", "", "", "", "", ""]),
        member_row(["E1", "Anne", "", "", "", ""]),
        member_row(["", "Nobody", "", "", "", ""]),
        member_row(["E3", "Cid", "bad-email", "", "maybe", "Marketing"]),
        member_row(["E4", "Dee", "", "", "", ""]),
    ];
    let report = pipeline.run(upsert_job(), &member_headers(), &rows).unwrap();
    let summary = &report.summary;

    assert_eq!(report.row_results.len(), rows.len());
    for (idx, result) in report.row_results.iter().enumerate() {
        assert_eq!(result.row_number, idx + 1);
        assert_eq!(result.outcome.is_success(), result.errors.is_empty());
    }
    assert_eq!(
        summary.created_count + summary.updated_count + summary.error_count,
        summary.total_rows
    );
    assert_eq!(summary.created_count, 2);
    assert_eq!(summary.updated_count, 1);
    assert_eq!(summary.error_count, 3);

    // 一行多个字段错误全部收集
    assert_eq!(report.row_results[4].errors.len(), 3);
    assert_eq!(report.detailed_errors.len(), 3);
}

#[test]
fn test_update_only_requires_match_fields() {
    let err = map_member_fields(ImportJob::builder(ImportPolicy::UpdateOnly))
        .build()
        .unwrap_err();
    assert!(err.is_schema_error());
}

#[test]
fn test_analyze_builds_preview() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let error_dir = TempDir::new().unwrap();
    let pipeline = create_pipeline(&db_path, &error_dir);

    let mut headers = member_headers();
    headers.push("Remarks".to_string());
    let mut rows = three_valid_rows();
    rows.push(member_row(["E4", "Dee", "", "", "Q", ""]));

    let preview = pipeline.analyze(&headers, &rows).unwrap();

    assert_eq!(preview.field_mapping["first_name"], "First Name");
    assert_eq!(preview.field_mapping["joined_on"], "Join Date");
    assert_eq!(preview.unmapped_headers, vec!["Remarks".to_string()]);
    assert_eq!(preview.value_mapping["active"]["yes"], "yes");
    assert_eq!(preview.value_mapping["department"]["sales"], "10");
    assert_eq!(preview.unmapped_values["active"], vec!["Q".to_string()]);
    assert_eq!(preview.sample_rows.len(), 3);
    assert!(preview.issues.iter().all(|i| !i.is_fatal()));
}
