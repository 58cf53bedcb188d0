pub mod coordination;
pub mod envelope;
pub mod readiness;
pub mod retrieval;
pub mod session;
pub mod server;
pub mod vector_ops;

pub use codegraph_core::{CodeGraphError, Result};
pub use envelope::{Envelope, FieldPriority, Profile, ToolSchema};
pub use readiness::{check_readiness, ReadinessOutcome};
pub use server::CodeGraphServer;
pub use session::{SessionManager, SessionToken, WorkspaceSession};
