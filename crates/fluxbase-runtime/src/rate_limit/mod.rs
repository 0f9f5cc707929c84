mod limiter;

pub use limiter::{
    build_key, InMemoryRateLimiter, PostgresRateLimiter, RateLimiter, SharedRateLimiter,
};
