// Database module
// Vector storage for integration documentation (LanceDB)

pub mod lancedb;

pub use self::lancedb::vector_store::{MismatchPolicy, VectorStore, VectorStoreConfig};
pub use self::lancedb::{CollectionManifest, IndexStats, QueryHit};
