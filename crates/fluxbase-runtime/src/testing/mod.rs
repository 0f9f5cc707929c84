//! Test harness for fluxbase-runtime integration tests.
//!
//! Builds on `fluxbase_core::testing` (explicit `TestDatabase` provisioning,
//! `MockHttp`) and adds a `TestContext` that wires a live `Database` broker
//! to a chosen `Principal`, for exercising RLS isolation and the
//! transaction-per-request invariant against a real PostgreSQL instance.

mod context;

pub use context::TestContext;
pub use fluxbase_core::testing::{
    assert_contains, assert_json_matches, error_contains, validation_error_for_field, IsolatedTestDb,
    MockHttp, MockHttpBuilder, MockRequest, MockResponse, TestDatabase,
};

use std::time::Duration;

/// Default test timeout.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(30);
