mod pool;

pub use pool::{BrokeredTransaction, Database, DatabasePool};
