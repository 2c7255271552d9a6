use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::MySqlPool;

use crate::accounting::hours::WorkedHours;
use crate::error::{AppError, AppResult};
use crate::model::attendance::{AttendanceRecord, DayState, Location, NewAttendance, Punch};
use crate::model::role::Role;
use crate::model::task::{Task, TaskFields, TaskFilter, TaskStatus};
use crate::model::user::{DriverChanges, NewUser, User};
use crate::store::{AttendanceStore, RecordFilter, TaskStore, UserStore};
use crate::utils::db_utils::{SqlValue, WhereClause, bind_all};

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

// -------------------------
// Attendance
// -------------------------

const ATTENDANCE_COLUMNS: &str = r#"
    id, driver_id, work_date,
    clock_in_at, clock_in_lat, clock_in_lng,
    clock_out_at, clock_out_lat, clock_out_lng,
    break_start_at, break_end_at,
    total_hours, overtime_hours, status,
    created_at, updated_at
"#;

#[derive(sqlx::FromRow)]
struct AttendanceRow {
    id: u64,
    driver_id: u64,
    work_date: NaiveDate,
    clock_in_at: DateTime<Utc>,
    clock_in_lat: f64,
    clock_in_lng: f64,
    clock_out_at: Option<DateTime<Utc>>,
    clock_out_lat: Option<f64>,
    clock_out_lng: Option<f64>,
    break_start_at: Option<DateTime<Utc>>,
    break_end_at: Option<DateTime<Utc>>,
    total_hours: f64,
    overtime_hours: f64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = AppError;

    fn try_from(row: AttendanceRow) -> AppResult<Self> {
        let corrupt = |what: &str| {
            tracing::error!(record_id = row.id, what, "Corrupt attendance row");
            AppError::StoreUnavailable(format!("attendance row {} has {what}", row.id))
        };

        let clock_in = Punch {
            time: row.clock_in_at,
            location: Location {
                latitude: row.clock_in_lat,
                longitude: row.clock_in_lng,
            },
        };
        let clock_out = match (row.clock_out_at, row.clock_out_lat, row.clock_out_lng) {
            (None, _, _) => None,
            (Some(time), Some(latitude), Some(longitude)) => Some(Punch {
                time,
                location: Location {
                    latitude,
                    longitude,
                },
            }),
            _ => return Err(corrupt("a clock-out without location")),
        };
        let state = DayState::from_parts(clock_in, clock_out, row.break_start_at, row.break_end_at)
            .ok_or_else(|| corrupt("a break end without a break start"))?;
        let status = row
            .status
            .parse()
            .map_err(|_| corrupt("an unknown status"))?;

        Ok(AttendanceRecord {
            id: row.id,
            driver_id: row.driver_id,
            date: row.work_date,
            state,
            hours: WorkedHours {
                total: row.total_hours,
                overtime: row.overtime_hours,
            },
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct MySqlAttendanceStore {
    pool: MySqlPool,
}

impl MySqlAttendanceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, clause: WhereClause) -> AppResult<Vec<AttendanceRecord>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance{} ORDER BY work_date DESC, id DESC",
            clause.sql()
        );
        tracing::debug!(sql = %sql, "Listing attendance");

        let rows = bind_all(sqlx::query_as::<_, AttendanceRow>(&sql), clause.into_values())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AttendanceRecord::try_from).collect()
    }
}

#[async_trait]
impl AttendanceStore for MySqlAttendanceStore {
    async fn insert(&self, new: NewAttendance, now: DateTime<Utc>) -> AppResult<AttendanceRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance
                (driver_id, work_date, clock_in_at, clock_in_lat, clock_in_lng, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.driver_id)
        .bind(new.date)
        .bind(new.clock_in.time)
        .bind(new.clock_in.location.latitude)
        .bind(new.clock_in.location.longitude)
        .bind(new.status.as_ref())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_id(),
            // uq_attendance_driver_day
            Err(e) if is_unique_violation(&e) => return Err(AppError::DuplicateClockIn),
            Err(e) => return Err(e.into()),
        };

        let mut clause = WhereClause::new();
        clause.push("id = ?", SqlValue::U64(id));
        self.fetch_where(clause)
            .await?
            .pop()
            .ok_or(AppError::NotFound("Attendance record"))
    }

    async fn find_day(
        &self,
        driver_id: u64,
        date: NaiveDate,
    ) -> AppResult<Option<AttendanceRecord>> {
        let mut clause = WhereClause::new();
        clause
            .push("driver_id = ?", SqlValue::U64(driver_id))
            .push("work_date = ?", SqlValue::Date(date));
        Ok(self.fetch_where(clause).await?.pop())
    }

    async fn compare_and_swap(
        &self,
        current: &AttendanceRecord,
        next: &AttendanceRecord,
    ) -> AppResult<bool> {
        let clock_out = next.state.clock_out();

        // `<=>` is MySQL's NULL-safe equality.
        let result = sqlx::query(
            r#"
            UPDATE attendance
            SET clock_out_at = ?, clock_out_lat = ?, clock_out_lng = ?,
                break_start_at = ?, break_end_at = ?,
                total_hours = ?, overtime_hours = ?,
                updated_at = ?
            WHERE id = ?
            AND clock_out_at <=> ?
            AND break_start_at <=> ?
            AND break_end_at <=> ?
            "#,
        )
        .bind(clock_out.map(|p| p.time))
        .bind(clock_out.map(|p| p.location.latitude))
        .bind(clock_out.map(|p| p.location.longitude))
        .bind(next.state.break_start())
        .bind(next.state.break_end())
        .bind(next.hours.total)
        .bind(next.hours.overtime)
        .bind(next.updated_at)
        .bind(current.id)
        .bind(current.state.clock_out().map(|p| p.time))
        .bind(current.state.break_start())
        .bind(current.state.break_end())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_day(&self, driver_id: u64, date: NaiveDate) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM attendance WHERE driver_id = ? AND work_date = ?")
            .bind(driver_id)
            .bind(date)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_for_driver(&self, driver_id: u64) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM attendance WHERE driver_id = ?")
            .bind(driver_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list(&self, filter: &RecordFilter) -> AppResult<Vec<AttendanceRecord>> {
        let mut clause = WhereClause::new();
        if let Some(driver_id) = filter.driver_id {
            clause.push("driver_id = ?", SqlValue::U64(driver_id));
        }
        if let Some(from) = filter.from {
            clause.push("work_date >= ?", SqlValue::Date(from));
        }
        if let Some(to) = filter.to {
            clause.push("work_date <= ?", SqlValue::Date(to));
        }
        if filter.overtime_only {
            clause.push_raw("overtime_hours > 0");
        }
        if filter.open_only {
            clause.push_raw("clock_out_at IS NULL");
        }
        self.fetch_where(clause).await
    }
}

// -------------------------
// Users
// -------------------------

const USER_COLUMNS: &str = r#"
    id, name, email, password_hash, role_id, area, department,
    schedule_start, schedule_end, break_duration, admin_contact, created_at
"#;

pub struct MySqlUserStore {
    pool: MySqlPool,
}

impl MySqlUserStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, clause: WhereClause, order: &str) -> AppResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users{}{order}", clause.sql());
        let users = bind_all(sqlx::query_as::<_, User>(&sql), clause.into_values())
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }
}

#[async_trait]
impl UserStore for MySqlUserStore {
    async fn create(&self, new: NewUser) -> AppResult<User> {
        let (schedule_start, schedule_end) = match new.schedule {
            Some(s) => (Some(s.start), Some(s.end)),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO users
                (name, email, password_hash, role_id, area, department,
                 schedule_start, schedule_end, break_duration, admin_contact)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role.id())
        .bind(&new.area)
        .bind(&new.department)
        .bind(schedule_start)
        .bind(schedule_end)
        .bind(new.break_duration)
        .bind(&new.admin_contact)
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_id(),
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        self.find_by_id(id).await?.ok_or(AppError::NotFound("User"))
    }

    async fn find_by_id(&self, id: u64) -> AppResult<Option<User>> {
        let mut clause = WhereClause::new();
        clause.push("id = ?", SqlValue::U64(id));
        Ok(self.fetch_where(clause, "").await?.pop())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let mut clause = WhereClause::new();
        clause.push("email = ?", SqlValue::Str(email.to_string()));
        Ok(self.fetch_where(clause, "").await?.pop())
    }

    async fn list_by_role(&self, role: Role) -> AppResult<Vec<User>> {
        let mut clause = WhereClause::new();
        clause.push("role_id = ?", SqlValue::U8(role.id()));
        self.fetch_where(clause, " ORDER BY name ASC, id ASC").await
    }

    async fn list_all(&self) -> AppResult<Vec<User>> {
        self.fetch_where(WhereClause::new(), " ORDER BY id ASC").await
    }

    async fn update_driver(&self, id: u64, changes: &DriverChanges) -> AppResult<Option<User>> {
        let mut user = match self.find_by_id(id).await? {
            Some(user) if user.is_driver() => user,
            _ => return Ok(None),
        };
        user.apply(changes);

        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = ?, email = ?, area = ?, department = ?,
                schedule_start = ?, schedule_end = ?, break_duration = ?, admin_contact = ?
            WHERE id = ?
            AND role_id = ?
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.area)
        .bind(&user.department)
        .bind(&user.schedule_start)
        .bind(&user.schedule_end)
        .bind(user.break_duration)
        .bind(&user.admin_contact)
        .bind(id)
        .bind(Role::Driver.id())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(Some(user)),
            Err(e) if is_unique_violation(&e) => {
                Err(AppError::Conflict("Email already registered".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_driver(&self, id: u64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ? AND role_id = ?")
            .bind(id)
            .bind(Role::Driver.id())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn store_refresh_token(
        &self,
        user_id: u64,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, jti, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_refresh_token(&self, jti: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE jti = ?
            AND revoked = FALSE
            AND expires_at > UTC_TIMESTAMP()
            "#,
        )
        .bind(jti)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

// -------------------------
// Tasks
// -------------------------

const TASK_COLUMNS: &str = r#"
    id, title, description, priority, status, due_date,
    assigned_to, created_by, created_at, updated_at
"#;

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: u64,
    title: String,
    description: String,
    priority: String,
    status: String,
    due_date: NaiveDate,
    assigned_to: u64,
    created_by: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> AppResult<Self> {
        let corrupt = || {
            tracing::error!(task_id = row.id, "Corrupt task row");
            AppError::StoreUnavailable(format!("task row {} is corrupt", row.id))
        };
        Ok(Task {
            id: row.id,
            priority: row.priority.parse().map_err(|_| corrupt())?,
            status: row.status.parse().map_err(|_| corrupt())?,
            title: row.title,
            description: row.description,
            due_date: row.due_date,
            assigned_to: row.assigned_to,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct MySqlTaskStore {
    pool: MySqlPool,
}

impl MySqlTaskStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, clause: WhereClause) -> AppResult<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks{} ORDER BY created_at DESC, id DESC",
            clause.sql()
        );
        let rows = bind_all(sqlx::query_as::<_, TaskRow>(&sql), clause.into_values())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Task::try_from).collect()
    }
}

#[async_trait]
impl TaskStore for MySqlTaskStore {
    async fn create(&self, fields: TaskFields, created_by: u64) -> AppResult<Task> {
        let done = sqlx::query(
            r#"
            INSERT INTO tasks
                (title, description, priority, status, due_date, assigned_to, created_by)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.priority.as_ref())
        .bind(TaskStatus::default().as_ref())
        .bind(fields.due_date)
        .bind(fields.assigned_to)
        .bind(created_by)
        .execute(&self.pool)
        .await?;

        self.find(done.last_insert_id())
            .await?
            .ok_or(AppError::NotFound("Task"))
    }

    async fn find(&self, id: u64) -> AppResult<Option<Task>> {
        let mut clause = WhereClause::new();
        clause.push("id = ?", SqlValue::U64(id));
        Ok(self.fetch_where(clause).await?.pop())
    }

    async fn list(&self, filter: TaskFilter) -> AppResult<Vec<Task>> {
        let mut clause = WhereClause::new();
        match filter {
            TaskFilter::All => {}
            TaskFilter::CreatedBy(id) => {
                clause.push("created_by = ?", SqlValue::U64(id));
            }
            TaskFilter::AssignedTo(id) => {
                clause.push("assigned_to = ?", SqlValue::U64(id));
            }
        }
        self.fetch_where(clause).await
    }

    async fn update(&self, id: u64, fields: &TaskFields) -> AppResult<Option<Task>> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET title = ?, description = ?, priority = ?, due_date = ?, assigned_to = ?,
                updated_at = CURRENT_TIMESTAMP(3)
            WHERE id = ?
            "#,
        )
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.priority.as_ref())
        .bind(fields.due_date)
        .bind(fields.assigned_to)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(id).await
    }

    async fn set_status(&self, id: u64, status: TaskStatus) -> AppResult<Option<Task>> {
        let result = sqlx::query(
            "UPDATE tasks SET status = ?, updated_at = CURRENT_TIMESTAMP(3) WHERE id = ?",
        )
        .bind(status.as_ref())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(id).await
    }

    async fn delete(&self, id: u64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
    async fn delete_for_user(&self, user_id: u64) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM tasks WHERE assigned_to = ? OR created_by = ?")
            .bind(user_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
