use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::accounting::hours::WorkedHours;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"latitude": 51.5072, "longitude": -0.1276}))]
pub struct Location {
    /// Degrees, -90..=90
    pub latitude: f64,
    /// Degrees, -180..=180
    pub longitude: f64,
}

impl Location {
    pub fn validated(self) -> AppResult<Self> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(AppError::validation(
                "latitude must be between -90 and 90 degrees",
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AppError::validation(
                "longitude must be between -180 and 180 degrees",
            ));
        }
        Ok(self)
    }
}

/// A clock-in or clock-out event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Punch {
    #[schema(value_type = String, format = DateTime, example = "2025-03-10T08:00:00Z")]
    pub time: DateTime<Utc>,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedBreak {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// What happened to the day's break by the time the driver clocked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakTime {
    NotTaken,
    /// Started but never ended; contributes nothing to the worked hours.
    Open(DateTime<Utc>),
    Closed(ClosedBreak),
}

/// Per-driver, per-day attendance state. "No record" is the NONE state and is
/// represented by the absence of an [`AttendanceRecord`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DayState {
    ClockedIn {
        clock_in: Punch,
        last_break: Option<ClosedBreak>,
    },
    OnBreak {
        clock_in: Punch,
        break_start: DateTime<Utc>,
    },
    ClockedOut {
        clock_in: Punch,
        clock_out: Punch,
        break_time: BreakTime,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    ClockedIn,
    OnBreak,
    ClockedOut,
}

impl DayState {
    pub fn phase(&self) -> Phase {
        match self {
            DayState::ClockedIn { .. } => Phase::ClockedIn,
            DayState::OnBreak { .. } => Phase::OnBreak,
            DayState::ClockedOut { .. } => Phase::ClockedOut,
        }
    }

    pub fn clock_in(&self) -> &Punch {
        match self {
            DayState::ClockedIn { clock_in, .. }
            | DayState::OnBreak { clock_in, .. }
            | DayState::ClockedOut { clock_in, .. } => clock_in,
        }
    }

    pub fn clock_out(&self) -> Option<&Punch> {
        match self {
            DayState::ClockedOut { clock_out, .. } => Some(clock_out),
            _ => None,
        }
    }

    pub fn break_start(&self) -> Option<DateTime<Utc>> {
        match self {
            DayState::ClockedIn { last_break, .. } => last_break.map(|b| b.start),
            DayState::OnBreak { break_start, .. } => Some(*break_start),
            DayState::ClockedOut { break_time, .. } => match break_time {
                BreakTime::NotTaken => None,
                BreakTime::Open(start) => Some(*start),
                BreakTime::Closed(b) => Some(b.start),
            },
        }
    }

    pub fn break_end(&self) -> Option<DateTime<Utc>> {
        match self {
            DayState::ClockedIn { last_break, .. } => last_break.map(|b| b.end),
            DayState::ClockedOut {
                break_time: BreakTime::Closed(b),
                ..
            } => Some(b.end),
            _ => None,
        }
    }

    /// Rebuilds the state from the flat optional columns used by the store.
    /// Returns `None` for combinations the state machine can never produce.
    pub fn from_parts(
        clock_in: Punch,
        clock_out: Option<Punch>,
        break_start: Option<DateTime<Utc>>,
        break_end: Option<DateTime<Utc>>,
    ) -> Option<Self> {
        let state = match (clock_out, break_start, break_end) {
            (None, None, None) => DayState::ClockedIn {
                clock_in,
                last_break: None,
            },
            (None, Some(start), Some(end)) => DayState::ClockedIn {
                clock_in,
                last_break: Some(ClosedBreak { start, end }),
            },
            (None, Some(break_start), None) => DayState::OnBreak {
                clock_in,
                break_start,
            },
            (Some(clock_out), start, end) => {
                let break_time = match (start, end) {
                    (None, None) => BreakTime::NotTaken,
                    (Some(start), None) => BreakTime::Open(start),
                    (Some(start), Some(end)) => BreakTime::Closed(ClosedBreak { start, end }),
                    (None, Some(_)) => return None,
                };
                DayState::ClockedOut {
                    clock_in,
                    clock_out,
                    break_time,
                }
            }
            (None, None, Some(_)) => return None,
        };
        Some(state)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceStatus {
    #[default]
    Present,
    Absent,
    Late,
}

/// One driver's attendance for one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub id: u64,
    pub driver_id: u64,
    pub date: NaiveDate,
    pub state: DayState,
    pub hours: WorkedHours,
    pub status: AttendanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Record about to be inserted by a clock-in.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttendance {
    pub driver_id: u64,
    pub date: NaiveDate,
    pub clock_in: Punch,
    pub status: AttendanceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn punch(s: &str) -> Punch {
        Punch {
            time: at(s),
            location: Location {
                latitude: 1.0,
                longitude: 2.0,
            },
        }
    }

    #[test]
    fn test_location_bounds() {
        let ok = Location {
            latitude: -90.0,
            longitude: 180.0,
        };
        assert!(ok.validated().is_ok());

        let bad_lat = Location {
            latitude: 90.5,
            longitude: 0.0,
        };
        assert!(matches!(bad_lat.validated(), Err(AppError::Validation(_))));

        let nan = Location {
            latitude: 0.0,
            longitude: f64::NAN,
        };
        assert!(matches!(nan.validated(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_from_parts_round_trips_each_phase() {
        let clock_in = punch("2025-03-10T08:00:00Z");
        let start = at("2025-03-10T12:00:00Z");
        let end = at("2025-03-10T12:30:00Z");

        let on_break = DayState::from_parts(clock_in, None, Some(start), None).unwrap();
        assert_eq!(on_break.phase(), Phase::OnBreak);
        assert_eq!(on_break.break_start(), Some(start));
        assert_eq!(on_break.break_end(), None);

        let back = DayState::from_parts(clock_in, None, Some(start), Some(end)).unwrap();
        assert_eq!(back.phase(), Phase::ClockedIn);
        assert_eq!(back.break_end(), Some(end));

        let out = DayState::from_parts(
            clock_in,
            Some(punch("2025-03-10T17:00:00Z")),
            Some(start),
            None,
        )
        .unwrap();
        assert_eq!(out.phase(), Phase::ClockedOut);
        assert_eq!(out.break_start(), Some(start));
        assert_eq!(out.break_end(), None);
    }

    #[test]
    fn test_from_parts_rejects_break_end_without_start() {
        let clock_in = punch("2025-03-10T08:00:00Z");
        let end = Some(at("2025-03-10T12:30:00Z"));
        assert!(DayState::from_parts(clock_in, None, None, end).is_none());
        assert!(
            DayState::from_parts(clock_in, Some(punch("2025-03-10T17:00:00Z")), None, end)
                .is_none()
        );
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(AttendanceStatus::default().as_ref(), "present");
        assert_eq!("late".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::Late);
        assert_eq!(Phase::OnBreak.to_string(), "on_break");
    }
}
