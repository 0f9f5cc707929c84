//! Testing utilities for fluxbase applications.
//!
//! # Philosophy
//!
//! Following sqlx's testing philosophy, we recommend testing procedures and
//! middleware against a real Postgres instance rather than mocks. `TestDatabase`
//! provisions an isolated schema per test; `MockHttp` is available for the rare
//! case where a procedure's `action` step needs to call out to an external API.
//!
//! # Zero-Config Database
//!
//! When the `embedded-test-db` feature is enabled, `TestDatabase` will automatically
//! download and start an embedded PostgreSQL instance if `DATABASE_URL` is not set.

pub mod assertions;
pub mod db;
pub mod mock_http;

pub use assertions::*;
pub use db::{IsolatedTestDb, TestDatabase};
pub use mock_http::{MockHttp, MockHttpBuilder, MockRequest, MockResponse};

use std::time::Duration;

/// Default test timeout.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(30);
