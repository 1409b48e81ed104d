// ==========================================
// 表格批量导入 - 结构描述提供者
// ==========================================
// 职责: 以静态描述代替运行时反射，向管道提供字段列表
// 实现: 内存列表 / JSON 描述文件
// ==========================================

use crate::domain::schema::RecordSchema;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::SchemaIntrospector;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 字段重名 / 空名校验
fn check_schema(schema: &RecordSchema) -> ImportResult<()> {
    if schema.record_type.trim().is_empty() {
        return Err(ImportError::InvalidJob("记录类型名不能为空".to_string()));
    }
    if schema.fields.is_empty() {
        return Err(ImportError::InvalidJob(format!(
            "记录类型 {} 没有任何字段",
            schema.record_type
        )));
    }

    let mut seen = HashSet::new();
    for field in &schema.fields {
        if field.name.trim().is_empty() {
            return Err(ImportError::InvalidJob("字段名不能为空".to_string()));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(ImportError::InvalidJob(format!("字段重名: {}", field.name)));
        }
    }
    Ok(())
}

// ==========================================
// StaticSchemaIntrospector - 内存描述
// ==========================================
pub struct StaticSchemaIntrospector {
    schema: RecordSchema,
}

impl StaticSchemaIntrospector {
    pub fn new(schema: RecordSchema) -> Self {
        Self { schema }
    }
}

impl SchemaIntrospector for StaticSchemaIntrospector {
    fn introspect(&self) -> ImportResult<RecordSchema> {
        check_schema(&self.schema)?;
        Ok(self.schema.clone())
    }
}

// ==========================================
// JsonSchemaIntrospector - JSON 描述文件
// ==========================================
// 文件格式即 RecordSchema 的 serde 表示
pub struct JsonSchemaIntrospector {
    path: PathBuf,
}

impl JsonSchemaIntrospector {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SchemaIntrospector for JsonSchemaIntrospector {
    fn introspect(&self) -> ImportResult<RecordSchema> {
        if !self.path.exists() {
            return Err(ImportError::FileNotFound(self.path.display().to_string()));
        }

        let content = fs::read_to_string(&self.path)?;
        let schema: RecordSchema = serde_json::from_str(&content)?;
        check_schema(&schema)?;

        debug!(
            path = %self.path.display(),
            record_type = %schema.record_type,
            fields = schema.fields.len(),
            "结构描述加载完成"
        );
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{FieldKind, SchemaField};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_static_rejects_duplicate_fields() {
        let schema = RecordSchema::new(
            "members",
            vec![
                SchemaField::new("name", "Name", FieldKind::Text),
                SchemaField::new("name", "Other", FieldKind::Text),
            ],
        );
        let err = StaticSchemaIntrospector::new(schema).introspect().unwrap_err();
        assert!(matches!(err, ImportError::InvalidJob(_)));
    }

    #[test]
    fn test_json_introspector_reads_descriptor() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "record_type": "members",
                "fields": [
                    {{"name": "external_id", "verbose_name": "External ID", "kind": "text", "required": true}},
                    {{"name": "status", "verbose_name": "Status", "kind": "choice",
                      "choices": [{{"code": "yes", "label": "Yes"}}, {{"code": "no", "label": "No"}}]}}
                ]
            }}"#
        )
        .unwrap();

        let schema = JsonSchemaIntrospector::new(file.path()).introspect().unwrap();
        assert_eq!(schema.record_type, "members");
        assert_eq!(schema.fields.len(), 2);
        assert!(schema.fields[0].required);
        assert!(schema.field("status").unwrap().has_choice_code("yes"));
    }

    #[test]
    fn test_json_introspector_missing_file() {
        let err = JsonSchemaIntrospector::new("/nonexistent/schema.json")
            .introspect()
            .unwrap_err();
        assert!(matches!(err, ImportError::FileNotFound(_)));
    }
}
