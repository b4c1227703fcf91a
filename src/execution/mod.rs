//! Pipeline execution: sequential engine, workspaces, run coordination

pub mod coordinator;
pub mod engine;
pub mod verifier;
pub mod workspace;

pub use coordinator::{RunCoordinator, RunTicket};
pub use engine::{EventHandler, ExecutionEvent, Pipeline};
pub use verifier::{Verification, Verifier, VerifyError, WorkspaceMode};
pub use workspace::Workspace;
