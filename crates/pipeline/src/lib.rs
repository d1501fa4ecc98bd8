//! Batch data pipeline: CSV ingestion into raw staging, then transform into
//! the clean commercial schema with per-customer master profiles.

pub mod error;
pub mod ingestion;
pub mod transform;

pub use error::{PipelineError, Result};
pub use ingestion::{
    BatchReferences, FileType, IngestionError, IngestionErrorCode, IngestionReport,
    IngestionService, PostgresStagingRepository, StagingRepository,
};
pub use transform::{
    AliasResolver, CatalogLoader, CatalogRepository, CleanRepository, NewProduct,
    PostgresCatalogRepository, PostgresCleanRepository, TransformOrchestrator,
    TransformPipelineStatus,
};
