//! The live procedure runtime: durable storage, filesystem ingest, and
//! transaction-bound execution, built on the data model in
//! `fluxbase_core::procedure`.

mod executor;
mod loader;
mod store;

pub use executor::ProcedureExecutor;
pub use loader::{parse_procedure_file, scan_directory, sync_from_directory, FilesystemLoader, SyncReport};
pub use store::ProcedureStore;
