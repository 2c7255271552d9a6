//! Persistence seams. Each trait has a MySQL backend for production and an
//! in-memory backend for local runs and tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::AppResult;
use crate::model::attendance::{AttendanceRecord, NewAttendance};
use crate::model::role::Role;
use crate::model::task::{Task, TaskFields, TaskFilter, TaskStatus};
use crate::model::user::{DriverChanges, NewUser, User};

pub mod memory;
pub mod mysql;

pub use memory::{MemoryAttendanceStore, MemoryTaskStore, MemoryUserStore};
pub use mysql::{MySqlAttendanceStore, MySqlTaskStore, MySqlUserStore};

/// Which attendance records a listing returns. Dates are inclusive; every
/// listing is ordered by `date` descending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub driver_id: Option<u64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub overtime_only: bool,
    /// Clocked in and not yet clocked out.
    pub open_only: bool,
}

impl RecordFilter {
    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.driver_id.is_none_or(|id| record.driver_id == id)
            && self.from.is_none_or(|from| record.date >= from)
            && self.to.is_none_or(|to| record.date <= to)
            && (!self.overtime_only || record.has_overtime())
            && (!self.open_only || record.is_open())
    }
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Fails with `DuplicateClockIn` when the driver already has a record for
    /// that date.
    async fn insert(&self, new: NewAttendance, now: DateTime<Utc>) -> AppResult<AttendanceRecord>;

    async fn find_day(&self, driver_id: u64, date: NaiveDate)
    -> AppResult<Option<AttendanceRecord>>;

    /// Writes `next` only if the stored record still matches `current` on its
    /// state columns. Returns `false` when another writer got there first.
    async fn compare_and_swap(
        &self,
        current: &AttendanceRecord,
        next: &AttendanceRecord,
    ) -> AppResult<bool>;

    /// Number of records removed.
    async fn delete_day(&self, driver_id: u64, date: NaiveDate) -> AppResult<u64>;

    async fn delete_for_driver(&self, driver_id: u64) -> AppResult<u64>;

    async fn list(&self, filter: &RecordFilter) -> AppResult<Vec<AttendanceRecord>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email is taken.
    async fn create(&self, new: NewUser) -> AppResult<User>;

    async fn find_by_id(&self, id: u64) -> AppResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Ordered by name.
    async fn list_by_role(&self, role: Role) -> AppResult<Vec<User>>;

    async fn list_all(&self) -> AppResult<Vec<User>>;

    /// `None` when no driver has that id.
    async fn update_driver(&self, id: u64, changes: &DriverChanges) -> AppResult<Option<User>>;

    async fn delete_driver(&self, id: u64) -> AppResult<bool>;

    async fn store_refresh_token(
        &self,
        user_id: u64,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Revokes an active token. Returns `false` if it was unknown or already
    /// revoked, so a refresh token can be redeemed once.
    async fn revoke_refresh_token(&self, jti: &str) -> AppResult<bool>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, fields: TaskFields, created_by: u64) -> AppResult<Task>;

    async fn find(&self, id: u64) -> AppResult<Option<Task>>;

    /// Newest first.
    async fn list(&self, filter: TaskFilter) -> AppResult<Vec<Task>>;

    async fn update(&self, id: u64, fields: &TaskFields) -> AppResult<Option<Task>>;

    async fn set_status(&self, id: u64, status: TaskStatus) -> AppResult<Option<Task>>;

    async fn delete(&self, id: u64) -> AppResult<bool>;

    /// Removes every task the user created or is assigned to.
    async fn delete_for_user(&self, user_id: u64) -> AppResult<u64>;
}
