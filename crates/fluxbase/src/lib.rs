//! fluxbase — a single-binary, PostgreSQL-backed request execution plane.
//!
//! This crate is the CLI entry point and the process wiring that assembles
//! `fluxbase-runtime` components into a running server. It carries no
//! platform logic of its own; `fluxbase-core` and `fluxbase-runtime` own
//! that.

mod runtime;

#[doc(hidden)]
pub use fluxbase_core;

pub use runtime::prelude;
pub use runtime::{Fluxbase, FluxbaseBuilder};
