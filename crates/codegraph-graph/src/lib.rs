pub mod architecture;
pub mod diff;
pub mod discovery;
pub mod index;
pub mod ingest;
pub mod rebuild;
pub mod resolve;
pub mod store;

pub use architecture::ArchitectureValidator;
pub use diff::{classify_changes, ChangeKind, FileChange};
pub use discovery::discover_source_files;
pub use index::GraphIndex;
pub use ingest::{IngestOutcome, IngestionPipeline};
pub use rebuild::{RebuildHandle, RebuildStatus, Rebuilder};
pub use store::{backoff_delay, SurrealGraphStore};
