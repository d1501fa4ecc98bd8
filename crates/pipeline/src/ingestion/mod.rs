//! CSV ingestion into raw staging (read, normalize, validate, load, report).

pub mod loader;
pub mod normalize;
pub mod reader;
pub mod schema;
pub mod service;
pub mod validate;

pub use loader::{row_hash, PostgresStagingRepository, StagingRepository};
pub use reader::CsvReader;
pub use schema::{
    ContactRecord, CustomerRecord, FileType, IngestionError, IngestionErrorCode, IngestionReport,
    RawRow, SalesLineRecord,
};
pub use service::IngestionService;
pub use validate::BatchReferences;
