//! Vector collection module.
//!
//! - `VectorStore`: abstract topic-scoped nearest-neighbor store
//! - `SqliteVectorStore`: in-process implementation over SQLite

mod sqlite;
mod store;

pub use sqlite::SqliteVectorStore;
pub use store::{DocumentHit, SourceMeta, StoredDocument, VectorStore};
