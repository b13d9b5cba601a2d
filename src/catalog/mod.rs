//! Catalog: database/table schema definitions and their persistence.

pub mod catalog;
pub mod column;
pub mod data_type;
pub mod database_info;
pub mod table_schema;
pub mod varint;

pub use catalog::Catalog;
pub use column::{ColumnDef, EnumDescriptor};
pub use data_type::{DataType, DataValue};
pub use database_info::DatabaseInfo;
pub use table_schema::TableSchema;
