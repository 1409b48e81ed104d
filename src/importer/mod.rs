// ==========================================
// 表格批量导入 - 导入层
// ==========================================
// 职责: 表头/取值映射、预检、行转换、匹配、批量写入、错误报告
// 输入: 表头列表 + 原始行（文件解析不属于管道）
// ==========================================

// 模块声明
pub mod csv_source;
pub mod error;
pub mod error_reporter;
pub mod header_mapper;
pub mod import_pipeline;
pub mod importer_trait;
pub mod match_resolver;
pub mod row_transformer;
pub mod schema_introspector;
pub mod similarity;
pub mod type_validator;
pub mod upsert_engine;
pub mod value_mapper;
pub mod value_parser;

// 重导出核心类型
pub use csv_source::{CsvSource, TabularData};
pub use error::{ImportError, ImportResult, RowError};
pub use error_reporter::ErrorReporter;
pub use header_mapper::HeaderMapper as HeaderMapperImpl;
pub use import_pipeline::ImportPipeline;
pub use match_resolver::MatchResolver;
pub use row_transformer::RowTransformer as RowTransformerImpl;
pub use schema_introspector::{JsonSchemaIntrospector, StaticSchemaIntrospector};
pub use type_validator::TypeValidator as TypeValidatorImpl;
pub use upsert_engine::UpsertEngine;
pub use value_mapper::ValueMapper as ValueMapperImpl;

// 重导出 Trait 接口
pub use importer_trait::{
    HeaderMapper, RowTransformer, SchemaIntrospector, TypeValidator, ValueMapper,
    ValueMappingOutcome,
};
