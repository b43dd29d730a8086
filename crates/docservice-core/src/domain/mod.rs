//! Domain model: routing decisions, per-request state, and the error taxonomy.

pub mod decision;
pub mod error;
pub mod request;

pub use decision::{Decision, TaskType};
pub use error::{Result, ServiceError};
pub use request::RequestState;
