pub mod context;

pub use context::{ExecutionContext, Principal, PrincipalRole, RequestMetadata};
