use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::attendance::BreakTime;

/// Daily threshold above which worked hours count as overtime.
pub const STANDARD_HOURS: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoursPolicy {
    pub standard_hours: f64,
}

impl Default for HoursPolicy {
    fn default() -> Self {
        Self {
            standard_hours: STANDARD_HOURS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WorkedHours {
    pub total: f64,
    pub overtime: f64,
}

impl WorkedHours {
    pub const ZERO: WorkedHours = WorkedHours {
        total: 0.0,
        overtime: 0.0,
    };
}

impl HoursPolicy {
    /// `total = (clock_out - clock_in - closed break) / 1h`, never negative;
    /// `overtime = max(0, total - standard_hours)`.
    ///
    /// An open break is not subtracted.
    pub fn compute(
        &self,
        clock_in: DateTime<Utc>,
        clock_out: DateTime<Utc>,
        break_time: &BreakTime,
    ) -> WorkedHours {
        let worked = (clock_out - clock_in).num_seconds();
        let on_break = match break_time {
            BreakTime::Closed(b) => (b.end - b.start).num_seconds().max(0),
            BreakTime::NotTaken | BreakTime::Open(_) => 0,
        };

        let total = ((worked - on_break) as f64 / 3600.0).max(0.0);
        let overtime = (total - self.standard_hours).max(0.0);

        WorkedHours { total, overtime }
    }
}
