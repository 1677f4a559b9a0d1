pub mod schema;

pub use schema::{Config, NotifyConfig, ResolvedStorage, RetentionConfig, StorageConfig};
