//! Test context pairing a live database broker with a chosen principal.

use fluxbase_core::config::DatabaseConfig;
use fluxbase_core::error::Result;
use fluxbase_core::principal::Principal;

use crate::db::{BrokeredTransaction, Database};

/// Integration-test harness: a connected `Database` plus the `Principal` to
/// act as. Acquiring a transaction through this context exercises the same
/// `SET LOCAL ROLE` / claims path a real request would.
pub struct TestContext {
    db: Database,
    principal: Principal,
}

impl TestContext {
    /// Connect using an explicit URL (see `fluxbase_core::testing::TestDatabase`
    /// for why this is never read from an ambient `DATABASE_URL`).
    pub async fn connect(url: &str, principal: Principal) -> Result<Self> {
        let config = DatabaseConfig {
            url: url.to_string(),
            ..DatabaseConfig::default()
        };
        let db = Database::from_config(&config).await?;
        Ok(Self { db, principal })
    }

    pub fn as_principal(mut self, principal: Principal) -> Self {
        self.principal = principal;
        self
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Acquire a transaction under the context's current principal.
    pub async fn transaction(&self) -> Result<BrokeredTransaction<'_>> {
        self.db.acquire(&self.principal).await
    }
}
