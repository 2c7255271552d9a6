//! Attendance state transitions for a single driver and day.
//!
//! These functions are pure: they take the current state and the instant of
//! the event and either return the next state or the precondition error.
//! Persisting the result atomically is the store's job.

use chrono::{DateTime, Utc};

use crate::accounting::hours::HoursPolicy;
use crate::error::{AppError, AppResult};
use crate::model::attendance::{AttendanceRecord, BreakTime, ClosedBreak, DayState, Punch};

impl DayState {
    pub fn start(clock_in: Punch) -> Self {
        DayState::ClockedIn {
            clock_in,
            last_break: None,
        }
    }

    /// Clocking out while on break leaves the break open.
    pub fn punch_out(&self, punch: Punch) -> AppResult<DayState> {
        let (clock_in, break_time) = match *self {
            DayState::ClockedIn {
                clock_in,
                last_break,
            } => (
                clock_in,
                last_break.map_or(BreakTime::NotTaken, BreakTime::Closed),
            ),
            DayState::OnBreak {
                clock_in,
                break_start,
            } => (clock_in, BreakTime::Open(break_start)),
            DayState::ClockedOut { .. } => return Err(AppError::NoActiveSession),
        };

        Ok(DayState::ClockedOut {
            clock_in,
            clock_out: punch,
            break_time,
        })
    }

    /// One break per day.
    pub fn start_break(&self, at: DateTime<Utc>) -> AppResult<DayState> {
        match *self {
            DayState::ClockedIn {
                clock_in,
                last_break: None,
            } => Ok(DayState::OnBreak {
                clock_in,
                break_start: at,
            }),
            _ => Err(AppError::NoActiveSession),
        }
    }

    pub fn end_break(&self, at: DateTime<Utc>) -> AppResult<DayState> {
        match *self {
            DayState::OnBreak {
                clock_in,
                break_start,
            } => Ok(DayState::ClockedIn {
                clock_in,
                last_break: Some(ClosedBreak {
                    start: break_start,
                    end: at,
                }),
            }),
            _ => Err(AppError::NoActiveBreak),
        }
    }
}

impl AttendanceRecord {
    /// Moves the record to `next`, recomputing hours once it is clocked out.
    pub fn advance(&self, next: DayState, now: DateTime<Utc>, policy: &HoursPolicy) -> Self {
        let hours = match &next {
            DayState::ClockedOut {
                clock_in,
                clock_out,
                break_time,
            } => policy.compute(clock_in.time, clock_out.time, break_time),
            _ => self.hours,
        };

        AttendanceRecord {
            state: next,
            hours,
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.clock_out().is_none()
    }

    pub fn has_overtime(&self) -> bool {
        self.hours.overtime > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::hours::WorkedHours;
    use crate::model::attendance::{AttendanceStatus, Location, Phase};
    use chrono::NaiveDate;

    fn at(hhmm: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("2025-03-10T{hhmm}:00Z"))
            .unwrap()
            .with_timezone(&Utc)
    }

    fn punch(hhmm: &str) -> Punch {
        Punch {
            time: at(hhmm),
            location: Location {
                latitude: 52.37,
                longitude: 4.89,
            },
        }
    }

    fn record(clock_in: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: 1,
            driver_id: 7,
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            state: DayState::start(punch(clock_in)),
            hours: WorkedHours::ZERO,
            status: AttendanceStatus::Present,
            created_at: at(clock_in),
            updated_at: at(clock_in),
        }
    }

    #[test]
    fn test_full_day_with_break() {
        let policy = HoursPolicy::default();
        let day = record("08:00");

        let day = day.advance(day.state.start_break(at("12:00")).unwrap(), at("12:00"), &policy);
        assert_eq!(day.state.phase(), Phase::OnBreak);

        let day = day.advance(day.state.end_break(at("12:30")).unwrap(), at("12:30"), &policy);
        assert_eq!(day.state.phase(), Phase::ClockedIn);
        assert_eq!(day.hours, WorkedHours::ZERO);

        let day = day.advance(day.state.punch_out(punch("17:00")).unwrap(), at("17:00"), &policy);
        assert_eq!(day.state.phase(), Phase::ClockedOut);
        assert_eq!(day.hours.total, 8.5);
        assert_eq!(day.hours.overtime, 0.5);
        assert_eq!(day.updated_at, at("17:00"));
        assert!(!day.is_open());
        assert!(day.has_overtime());
    }

    #[test]
    fn test_clock_out_during_break_keeps_break_open() {
        let policy = HoursPolicy::default();
        let day = record("08:00");
        let day = day.advance(day.state.start_break(at("12:00")).unwrap(), at("12:00"), &policy);
        let day = day.advance(day.state.punch_out(punch("17:00")).unwrap(), at("17:00"), &policy);

        assert_eq!(day.state.break_start(), Some(at("12:00")));
        assert_eq!(day.state.break_end(), None);
        assert_eq!(day.hours.total, 9.0);
        assert_eq!(day.hours.overtime, 1.0);
    }

    #[test]
    fn test_end_break_before_start_fails() {
        let day = record("08:00");
        assert!(matches!(
            day.state.end_break(at("09:00")),
            Err(AppError::NoActiveBreak)
        ));
    }

    #[test]
    fn test_second_break_is_rejected() {
        let state = DayState::start(punch("08:00"));
        let state = state.start_break(at("10:00")).unwrap();
        assert!(matches!(
            state.start_break(at("10:05")),
            Err(AppError::NoActiveSession)
        ));
        let state = state.end_break(at("10:15")).unwrap();
        assert!(matches!(
            state.start_break(at("14:00")),
            Err(AppError::NoActiveSession)
        ));
    }

    #[test]
    fn test_clocked_out_is_terminal() {
        let state = DayState::start(punch("08:00"))
            .punch_out(punch("16:00"))
            .unwrap();
        assert!(matches!(
            state.punch_out(punch("16:05")),
            Err(AppError::NoActiveSession)
        ));
        assert!(matches!(
            state.start_break(at("16:10")),
            Err(AppError::NoActiveSession)
        ));
        assert!(matches!(
            state.end_break(at("16:10")),
            Err(AppError::NoActiveBreak)
        ));
    }

    #[test]
    fn test_open_break_after_clock_out_cannot_be_closed() {
        let state = DayState::start(punch("08:00"))
            .start_break(at("12:00"))
            .unwrap()
            .punch_out(punch("17:00"))
            .unwrap();
        assert!(matches!(
            state.end_break(at("17:05")),
            Err(AppError::NoActiveBreak)
        ));
    }

    #[test]
    fn test_hours_stay_zero_until_clock_out() {
        let policy = HoursPolicy::default();
        let day = record("08:00");
        let on_break = day.advance(day.state.start_break(at("20:00")).unwrap(), at("20:00"), &policy);
        assert_eq!(on_break.hours, WorkedHours::ZERO);
        assert!(on_break.is_open());
    }
}
