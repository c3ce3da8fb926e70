pub mod error;
pub mod types;

pub use error::{ManagerError, ManagerResult, PropagationError, Result};
pub use types::ContextId;
