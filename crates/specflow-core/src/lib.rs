pub mod error;
pub mod execution;
pub mod platform;

pub use error::BackendError;
pub use execution::{ExecutionRequest, ExecutionResult};
pub use platform::{Availability, BackendPlatform};
