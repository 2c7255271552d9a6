use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::accounting::day::{Clock, DayBoundary};
use crate::accounting::hours::HoursPolicy;
use crate::error::{AppError, AppResult};
use crate::model::attendance::{
    AttendanceRecord, AttendanceStatus, DayState, Location, NewAttendance, Punch,
};
use crate::store::{AttendanceStore, RecordFilter};

/// Inclusive date range; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> AppResult<Self> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(AppError::validation("startDate must not be after endDate"));
            }
        }
        Ok(Self { from, to })
    }

    fn filter(self) -> RecordFilter {
        RecordFilter {
            from: self.from,
            to: self.to,
            ..Default::default()
        }
    }
}

/// Runs each attendance operation as one read, one engine transition and one
/// conditional write.
pub struct AttendanceService {
    store: Arc<dyn AttendanceStore>,
    clock: Arc<dyn Clock>,
    boundary: DayBoundary,
    policy: HoursPolicy,
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        clock: Arc<dyn Clock>,
        boundary: DayBoundary,
        policy: HoursPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            boundary,
            policy,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.boundary.day_of(self.clock.now())
    }

    pub async fn clock_in(&self, driver_id: u64, location: Location) -> AppResult<AttendanceRecord> {
        let location = location.validated()?;
        let now = self.clock.now();

        let new = NewAttendance {
            driver_id,
            date: self.boundary.day_of(now),
            clock_in: Punch {
                time: now,
                location,
            },
            status: AttendanceStatus::Present,
        };

        let record = self.store.insert(new, now).await?;
        info!(driver_id, date = %record.date, "Clocked in");
        Ok(record)
    }

    pub async fn clock_out(
        &self,
        driver_id: u64,
        location: Location,
    ) -> AppResult<AttendanceRecord> {
        let location = location.validated()?;

        let record = self
            .transition(
                driver_id,
                || AppError::NoActiveSession,
                |state, now| {
                    state.punch_out(Punch {
                        time: now,
                        location,
                    })
                },
            )
            .await?;

        info!(
            driver_id,
            total_hours = record.hours.total,
            overtime_hours = record.hours.overtime,
            "Clocked out"
        );
        Ok(record)
    }

    pub async fn start_break(&self, driver_id: u64) -> AppResult<AttendanceRecord> {
        self.transition(
            driver_id,
            || AppError::NoActiveSession,
            |state, now| state.start_break(now),
        )
        .await
    }

    pub async fn end_break(&self, driver_id: u64) -> AppResult<AttendanceRecord> {
        self.transition(
            driver_id,
            || AppError::NoActiveBreak,
            |state, now| state.end_break(now),
        )
        .await
    }

    /// `precondition` is the error for "no record today" and for a write that
    /// lost the race to a concurrent one.
    async fn transition<F>(
        &self,
        driver_id: u64,
        precondition: fn() -> AppError,
        step: F,
    ) -> AppResult<AttendanceRecord>
    where
        F: FnOnce(&DayState, DateTime<Utc>) -> AppResult<DayState>,
    {
        let now = self.clock.now();
        let today = self.boundary.day_of(now);

        let current = self
            .store
            .find_day(driver_id, today)
            .await?
            .ok_or_else(precondition)?;

        let next = current.advance(step(&current.state, now)?, now, &self.policy);

        if !self.store.compare_and_swap(&current, &next).await? {
            warn!(driver_id, record_id = current.id, "Concurrent attendance update");
            return Err(precondition());
        }

        debug!(driver_id, phase = %next.state.phase(), "Attendance updated");
        Ok(next)
    }

    pub async fn history(&self, driver_id: u64, range: DateRange) -> AppResult<Vec<AttendanceRecord>> {
        self.store
            .list(&RecordFilter {
                driver_id: Some(driver_id),
                ..range.filter()
            })
            .await
    }

    pub async fn records(
        &self,
        range: DateRange,
        driver_id: Option<u64>,
    ) -> AppResult<Vec<AttendanceRecord>> {
        self.store
            .list(&RecordFilter {
                driver_id,
                ..range.filter()
            })
            .await
    }

    pub async fn overtime(
        &self,
        range: DateRange,
        driver_id: Option<u64>,
    ) -> AppResult<Vec<AttendanceRecord>> {
        self.store
            .list(&RecordFilter {
                driver_id,
                overtime_only: true,
                ..range.filter()
            })
            .await
    }

    /// Today's records that are clocked in and not yet clocked out.
    pub async fn active(&self) -> AppResult<Vec<AttendanceRecord>> {
        let today = self.today();
        self.store
            .list(&RecordFilter {
                from: Some(today),
                to: Some(today),
                open_only: true,
                ..Default::default()
            })
            .await
    }

    pub async fn on_day(&self, date: NaiveDate) -> AppResult<Vec<AttendanceRecord>> {
        self.records(
            DateRange {
                from: Some(date),
                to: Some(date),
            },
            None,
        )
        .await
    }

    /// Idempotent: resetting a day with no record is not an error.
    pub async fn reset_today(&self, driver_id: u64) -> AppResult<u64> {
        let today = self.today();
        let removed = self.store.delete_day(driver_id, today).await?;
        info!(driver_id, date = %today, removed, "Attendance reset");
        Ok(removed)
    }

    pub async fn purge_driver(&self, driver_id: u64) -> AppResult<u64> {
        self.store.delete_for_driver(driver_id).await
    }
}
