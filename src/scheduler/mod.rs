pub mod market_hours;
pub mod orchestrator;

pub use market_hours::{Clock, SystemClock, TradingCalendar};
pub use orchestrator::{Orchestrator, RunDeps};
