//! Domain types for historical performance collection.
//!
//! All types enforce their invariants at construction time, so code that
//! receives them (the task builder, the store, the orchestrator) can trust
//! their validity.

mod day_type;
mod hhmm;
mod record;
mod route;
mod station;
mod task;
mod window;

pub use day_type::{DayType, DayTypeError, parse_day_types};
pub use hhmm::{Hhmm, TimeError, delay_minutes};
pub use record::{ServiceRecord, rid_service_date};
pub use route::{Route, TimeWindow};
pub use station::{Crs, InvalidCrs};
pub use task::{Task, TaskKey, TaskOutcome, TaskStatus};
pub use window::{DateWindow, MAX_WINDOW_DAYS};
