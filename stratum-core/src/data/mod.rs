//! Extraction, transformation, versioned storage and lineage.

pub mod format;
pub mod generate;
pub mod lineage;
pub mod schema;
pub mod source;
pub mod storage;
pub mod table;
pub mod transform;

pub use format::{WriteFormat, read_table};
pub use lineage::{LineageRecord, LineageRecorder};
pub use schema::{ColumnSchema, ColumnType, SchemaDefinition};
pub use source::{CsvSource, DataSource, DataSourceInfo};
pub use storage::{
    Clock, SystemClock, VersionDescriptor, VersionedWriter, list_versions, read_latest,
    read_latest_table,
};
pub use table::Table;
pub use transform::{TransformPipeline, TransformStep, sales_pipeline};
