pub mod day;
pub mod engine;
pub mod hours;
pub mod service;

pub use day::{Clock, DayBoundary, SystemClock};
pub use hours::HoursPolicy;
pub use service::{AttendanceService, DateRange};
