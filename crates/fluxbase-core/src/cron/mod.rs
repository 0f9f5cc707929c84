mod context;
mod schedule;

pub use context::{CronContext, CronLog};
pub use schedule::CronSchedule;
