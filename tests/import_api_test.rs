// ==========================================
// 导入 API 端到端测试
// ==========================================
// 模拟调用方: 分析文件 → 执行导入 → 查询历史
// ==========================================


use tabular_import::api::{ApiError, ImportApi};
use tabular_import::config::{config_keys, ConfigManager};
use tabular_import::domain::{ImportJobSpec, ImportPolicy, ImportStatus, IssueKind};
use tabular_import::importer::{JsonSchemaIntrospector, SchemaIntrospector};
use tabular_import::logging;
use tempfile::TempDir;
use test_helpers::{
    create_test_db, members_schema, shared_connection, write_csv, write_schema_json,
};

const MEMBERS_CSV: &str = "\
External ID,First Name,Email Address,Join Date,Active,Department
E1,Ann,ann@example.com,2024-01-15,Y,Sales
E2,Bob,bob@example.com,31/31/2024,no,Engineering
E3,Cid,,,yes,20
";

/// 错误文件目录指向临时目录
fn configure_error_dir(db_path: &str, dir: &TempDir) {
    let manager = ConfigManager::new(db_path).expect("创建配置管理器失败");
    manager
        .set_global_config_value(
            config_keys::ERROR_REPORT_DIR,
            &dir.path().to_string_lossy(),
        )
        .expect("写入配置失败");
}

fn upsert_spec() -> ImportJobSpec {
    ImportJobSpec {
        import_name: "members".to_string(),
        policy: ImportPolicy::Upsert,
        match_fields: vec!["external_id".to_string()],
        actor: Some("alice".to_string()),
        ..ImportJobSpec::default()
    }
}

#[tokio::test]
async fn test_import_file_with_auto_map_records_history() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let dir = TempDir::new().unwrap();
    configure_error_dir(&db_path, &dir);
    let csv_path = write_csv(&dir, "members.csv", MEMBERS_CSV);

    let api = ImportApi::new(&db_path, members_schema()).unwrap();
    let response = api
        .import_file(&csv_path.to_string_lossy(), upsert_spec(), true)
        .await
        .expect("导入应返回汇总");

    assert_eq!(response.status, ImportStatus::Partial);
    assert_eq!(response.summary.total_rows, 3);
    assert_eq!(response.summary.created_count, 2);
    assert_eq!(response.summary.error_count, 1);
    assert_eq!(response.summary.success_rate, 66.7);
    assert_eq!(response.detailed_errors.len(), 1);
    assert_eq!(response.detailed_errors[0].row_number, 2);

    let report_path = response
        .summary
        .error_report_path
        .clone()
        .expect("应生成错误文件");
    assert!(report_path.contains("members_errors_"));

    let history = api.recent_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    let record = &history[0];
    assert_eq!(record.history_id, response.history_id);
    assert_eq!(record.import_name, "members");
    assert_eq!(record.record_type, "members");
    assert_eq!(record.source_name.as_deref(), Some("members.csv"));
    assert_eq!(record.status, ImportStatus::Partial);
    assert_eq!(record.field_mapping["joined_on"], "Join Date");
    assert_eq!(record.actor.as_deref(), Some("alice"));
    assert_eq!(record.error_summary.len(), 1);

    let fetched = api.get_history(&response.history_id).await.unwrap();
    assert_eq!(fetched.created_count, 2);
}

#[tokio::test]
async fn test_schema_error_returns_failed_summary() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let dir = TempDir::new().unwrap();
    configure_error_dir(&db_path, &dir);
    let csv_path = write_csv(&dir, "members.csv", MEMBERS_CSV);

    // 未开启自动映射且未提供映射 → 必填字段未覆盖
    let api = ImportApi::new(&db_path, members_schema()).unwrap();
    let response = api
        .import_file(&csv_path.to_string_lossy(), upsert_spec(), false)
        .await
        .expect("结构错误也应返回汇总");

    assert_eq!(response.status, ImportStatus::Failed);
    assert_eq!(response.summary.created_count, 0);
    assert_eq!(response.summary.updated_count, 0);
    assert_eq!(response.summary.errors.len(), 1);
    assert!(response
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::RequiredUnmapped));

    let history = api.recent_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ImportStatus::Failed);
}

#[tokio::test]
async fn test_invalid_job_returns_failed_summary() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let dir = TempDir::new().unwrap();
    configure_error_dir(&db_path, &dir);
    let csv_path = write_csv(&dir, "members.csv", MEMBERS_CSV);

    let spec = ImportJobSpec {
        policy: ImportPolicy::UpdateOnly,
        ..ImportJobSpec::default()
    };
    let api = ImportApi::new(&db_path, members_schema()).unwrap();
    let response = api
        .import_file(&csv_path.to_string_lossy(), spec, true)
        .await
        .unwrap();

    assert_eq!(response.status, ImportStatus::Failed);
    assert!(response.summary.errors[0].contains("update_only"));
}

#[tokio::test]
async fn test_analyze_file_preview() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let dir = TempDir::new().unwrap();
    let csv_path = write_csv(&dir, "members.csv", MEMBERS_CSV);

    let api = ImportApi::new(&db_path, members_schema()).unwrap();
    let preview = api.analyze_file(&csv_path.to_string_lossy()).await.unwrap();

    assert_eq!(preview.headers.len(), 6);
    assert_eq!(preview.field_mapping.len(), 6);
    assert!(preview.unmapped_headers.is_empty());
    assert_eq!(preview.value_mapping["active"]["y"], "yes");
    assert!(preview
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::TypeMismatch && i.field == "joined_on"));
    assert_eq!(preview.sample_rows.len(), 3);
}

#[tokio::test]
async fn test_missing_file_is_an_error() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let api = ImportApi::new(&db_path, members_schema()).unwrap();

    let err = api
        .import_file("/nonexistent/members.csv", upsert_spec(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn test_summary_error_limit_from_config() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let dir = TempDir::new().unwrap();
    configure_error_dir(&db_path, &dir);
    let manager = ConfigManager::new(&db_path).unwrap();
    manager
        .set_global_config_value(config_keys::SUMMARY_ERROR_LIMIT, "1")
        .unwrap();

    let csv_path = write_csv(
        &dir,
        "bad.csv",
        "External ID,First Name\n,Ann\n,Bob\n,Cid\n",
    );
    let conn = shared_connection(&db_path);
    let api = ImportApi::from_connection(conn, members_schema()).unwrap();
    let response = api
        .import_file(&csv_path.to_string_lossy(), upsert_spec(), true)
        .await
        .unwrap();

    assert_eq!(response.status, ImportStatus::Failed);
    assert_eq!(response.summary.error_count, 3);
    assert_eq!(response.summary.errors.len(), 1);
    assert!(response.summary.has_more_errors);
    assert_eq!(response.detailed_errors.len(), 3);
}

#[tokio::test]
async fn test_schema_loaded_from_json_descriptor() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let dir = TempDir::new().unwrap();
    configure_error_dir(&db_path, &dir);
    let schema_path = write_schema_json(&dir, &members_schema());
    let csv_path = write_csv(&dir, "members.csv", "External ID,First Name\nE1,Ann\n");

    let schema = JsonSchemaIntrospector::new(&schema_path).introspect().unwrap();
    assert_eq!(schema, members_schema());

    let api = ImportApi::new(&db_path, schema).unwrap();
    let response = api
        .import_file(&csv_path.to_string_lossy(), ImportJobSpec::default(), true)
        .await
        .unwrap();

    assert_eq!(response.status, ImportStatus::Success);
    assert_eq!(response.summary.created_count, 1);
    // 未提供任务名时使用记录类型
    let history = api.get_history(&response.history_id).await.unwrap();
    assert_eq!(history.import_name, "members");
    assert_eq!(history.policy, ImportPolicy::CreateOnly);
}

/// 生成 n 行会员 CSV
fn members_csv(prefix: &str, n: usize) -> String {
    let mut content = String::from("External ID,First Name\n");
    for i in 0..n {
        content.push_str(&format!("{}{},Member {}\n", prefix, i, i));
    }
    content
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_imports_on_one_api_both_succeed() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let dir = TempDir::new().unwrap();
    configure_error_dir(&db_path, &dir);
    let first = write_csv(&dir, "first.csv", &members_csv("A", 2000));
    let second = write_csv(&dir, "second.csv", &members_csv("B", 2000));

    let api = ImportApi::new(&db_path, members_schema()).unwrap();
    let (first_path, second_path) = (first.to_string_lossy(), second.to_string_lossy());
    let (a, b) = tokio::join!(
        api.import_file(&first_path, ImportJobSpec::default(), true),
        api.import_file(&second_path, ImportJobSpec::default(), true),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.status, ImportStatus::Success, "{:?}", a.summary.errors);
    assert_eq!(b.status, ImportStatus::Success, "{:?}", b.summary.errors);
    assert_eq!(a.summary.created_count + b.summary.created_count, 4000);

    let store = test_helpers::test_store(&db_path);
    assert_eq!(store.count(api.schema()).unwrap(), 4000);
    assert_eq!(api.recent_history(10).await.unwrap().len(), 2);
}
