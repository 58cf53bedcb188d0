pub mod config;
pub mod error;
pub mod ids;
pub mod metadata;
pub mod node;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{CodeGraphError, Result};
pub use ids::{canonical_relative_path, content_hash, project_fingerprint, ScopedId};
pub use metadata::WorkspaceMetadata;
pub use node::{Edge, Node};
pub use traits::{GraphStatement, GraphStore};
pub use types::*;
