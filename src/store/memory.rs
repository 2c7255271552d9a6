use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::accounting::hours::WorkedHours;
use crate::error::{AppError, AppResult};
use crate::model::attendance::{AttendanceRecord, DayState, NewAttendance};
use crate::model::role::Role;
use crate::model::task::{Task, TaskFields, TaskFilter, TaskStatus};
use crate::model::user::{DriverChanges, NewUser, User};
use crate::store::{AttendanceStore, RecordFilter, TaskStore, UserStore};

// Every check-and-write below happens under one guard, which is what makes
// the conditional operations atomic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Table<T> {
    next_id: u64,
    rows: BTreeMap<u64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryAttendanceStore {
    table: Mutex<Table<AttendanceRecord>>,
}

impl MemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttendanceStore for MemoryAttendanceStore {
    async fn insert(&self, new: NewAttendance, now: DateTime<Utc>) -> AppResult<AttendanceRecord> {
        let mut table = lock(&self.table);

        let taken = table
            .rows
            .values()
            .any(|r| r.driver_id == new.driver_id && r.date == new.date);
        if taken {
            return Err(AppError::DuplicateClockIn);
        }

        let record = AttendanceRecord {
            id: table.allocate_id(),
            driver_id: new.driver_id,
            date: new.date,
            state: DayState::start(new.clock_in),
            hours: WorkedHours::ZERO,
            status: new.status,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_day(
        &self,
        driver_id: u64,
        date: NaiveDate,
    ) -> AppResult<Option<AttendanceRecord>> {
        let table = lock(&self.table);
        Ok(table
            .rows
            .values()
            .find(|r| r.driver_id == driver_id && r.date == date)
            .cloned())
    }

    async fn compare_and_swap(
        &self,
        current: &AttendanceRecord,
        next: &AttendanceRecord,
    ) -> AppResult<bool> {
        let mut table = lock(&self.table);
        match table.rows.get_mut(&current.id) {
            Some(stored) if stored.state == current.state => {
                *stored = next.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_day(&self, driver_id: u64, date: NaiveDate) -> AppResult<u64> {
        let mut table = lock(&self.table);
        let before = table.rows.len();
        table
            .rows
            .retain(|_, r| !(r.driver_id == driver_id && r.date == date));
        Ok((before - table.rows.len()) as u64)
    }

    async fn delete_for_driver(&self, driver_id: u64) -> AppResult<u64> {
        let mut table = lock(&self.table);
        let before = table.rows.len();
        table.rows.retain(|_, r| r.driver_id != driver_id);
        Ok((before - table.rows.len()) as u64)
    }

    async fn list(&self, filter: &RecordFilter) -> AppResult<Vec<AttendanceRecord>> {
        let table = lock(&self.table);
        let mut records: Vec<_> = table
            .rows
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(records)
    }
}

struct RefreshToken {
    user_id: u64,
    expires_at: DateTime<Utc>,
    revoked: bool,
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Table<User>>,
    refresh_tokens: Mutex<HashMap<String, RefreshToken>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn email_taken(table: &Table<User>, email: &str, except: Option<u64>) -> bool {
    table
        .rows
        .values()
        .any(|u| u.email == email && Some(u.id) != except)
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: NewUser) -> AppResult<User> {
        let mut table = lock(&self.users);
        if email_taken(&table, &new.email, None) {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let (schedule_start, schedule_end) = match new.schedule {
            Some(s) => (Some(s.start), Some(s.end)),
            None => (None, None),
        };
        let user = User {
            id: table.allocate_id(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role_id: new.role.id(),
            area: new.area,
            department: new.department,
            schedule_start,
            schedule_end,
            break_duration: new.break_duration,
            admin_contact: new.admin_contact,
            created_at: Utc::now(),
        };
        table.rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: u64) -> AppResult<Option<User>> {
        Ok(lock(&self.users).rows.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(lock(&self.users)
            .rows
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list_by_role(&self, role: Role) -> AppResult<Vec<User>> {
        let mut users: Vec<_> = lock(&self.users)
            .rows
            .values()
            .filter(|u| u.role() == Some(role))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn list_all(&self) -> AppResult<Vec<User>> {
        Ok(lock(&self.users).rows.values().cloned().collect())
    }

    async fn update_driver(&self, id: u64, changes: &DriverChanges) -> AppResult<Option<User>> {
        let mut table = lock(&self.users);
        if let Some(email) = &changes.email {
            if email_taken(&table, email, Some(id)) {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
        }

        match table.rows.get_mut(&id) {
            Some(user) if user.is_driver() => {
                user.apply(changes);
                Ok(Some(user.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_driver(&self, id: u64) -> AppResult<bool> {
        let mut table = lock(&self.users);
        let is_driver = table.rows.get(&id).is_some_and(User::is_driver);
        if is_driver {
            table.rows.remove(&id);
            lock(&self.refresh_tokens)
                .values_mut()
                .filter(|t| t.user_id == id)
                .for_each(|t| t.revoked = true);
        }
        Ok(is_driver)
    }

    async fn store_refresh_token(
        &self,
        user_id: u64,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        lock(&self.refresh_tokens).insert(
            jti.to_string(),
            RefreshToken {
                user_id,
                expires_at,
                revoked: false,
            },
        );
        Ok(())
    }

    async fn revoke_refresh_token(&self, jti: &str) -> AppResult<bool> {
        let mut tokens = lock(&self.refresh_tokens);
        match tokens.get_mut(jti) {
            Some(token) if !token.revoked && token.expires_at > Utc::now() => {
                token.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryTaskStore {
    table: Mutex<Table<Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, fields: TaskFields, created_by: u64) -> AppResult<Task> {
        let mut table = lock(&self.table);
        let now = Utc::now();
        let task = Task {
            id: table.allocate_id(),
            title: fields.title,
            description: fields.description,
            priority: fields.priority,
            status: TaskStatus::default(),
            due_date: fields.due_date,
            assigned_to: fields.assigned_to,
            created_by,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find(&self, id: u64) -> AppResult<Option<Task>> {
        Ok(lock(&self.table).rows.get(&id).cloned())
    }

    async fn list(&self, filter: TaskFilter) -> AppResult<Vec<Task>> {
        let mut tasks: Vec<_> = lock(&self.table)
            .rows
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tasks)
    }

    async fn update(&self, id: u64, fields: &TaskFields) -> AppResult<Option<Task>> {
        let mut table = lock(&self.table);
        Ok(table.rows.get_mut(&id).map(|task| {
            task.title = fields.title.clone();
            task.description = fields.description.clone();
            task.priority = fields.priority;
            task.due_date = fields.due_date;
            task.assigned_to = fields.assigned_to;
            task.updated_at = Utc::now();
            task.clone()
        }))
    }

    async fn set_status(&self, id: u64, status: TaskStatus) -> AppResult<Option<Task>> {
        let mut table = lock(&self.table);
        Ok(table.rows.get_mut(&id).map(|task| {
            task.status = status;
            task.updated_at = Utc::now();
            task.clone()
        }))
    }

    async fn delete(&self, id: u64) -> AppResult<bool> {
        Ok(lock(&self.table).rows.remove(&id).is_some())
    }

    async fn delete_for_user(&self, user_id: u64) -> AppResult<u64> {
        let mut table = lock(&self.table);
        let before = table.rows.len();
        table
            .rows
            .retain(|_, t| t.assigned_to != user_id && t.created_by != user_id);
        Ok((before - table.rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::{AttendanceStatus, Location, Punch};
    use crate::model::task::TaskPriority;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn clock_in(driver_id: u64, d: u32) -> NewAttendance {
        NewAttendance {
            driver_id,
            date: day(d),
            clock_in: Punch {
                time: at(&format!("2025-03-{d:02}T08:00:00Z")),
                location: Location {
                    latitude: 0.0,
                    longitude: 0.0,
                },
            },
            status: AttendanceStatus::Present,
        }
    }

    #[actix_web::test]
    async fn test_insert_is_unique_per_driver_and_day() {
        let store = MemoryAttendanceStore::new();
        let now = at("2025-03-10T08:00:00Z");
        store.insert(clock_in(1, 10), now).await.unwrap();

        let err = store.insert(clock_in(1, 10), now).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateClockIn));

        store.insert(clock_in(2, 10), now).await.unwrap();
        store.insert(clock_in(1, 11), now).await.unwrap();

        let same_day = RecordFilter {
            driver_id: Some(1),
            from: Some(day(10)),
            to: Some(day(10)),
            ..Default::default()
        };
        assert_eq!(store.list(&same_day).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_compare_and_swap_detects_stale_state() {
        let store = MemoryAttendanceStore::new();
        let now = at("2025-03-10T08:00:00Z");
        let record = store.insert(clock_in(1, 10), now).await.unwrap();

        let on_break = AttendanceRecord {
            state: record.state.start_break(at("2025-03-10T12:00:00Z")).unwrap(),
            ..record.clone()
        };
        assert!(store.compare_and_swap(&record, &on_break).await.unwrap());
        // Second writer still holds the pre-break snapshot.
        assert!(!store.compare_and_swap(&record, &on_break).await.unwrap());

        store.delete_day(1, day(10)).await.unwrap();
        assert!(!store.compare_and_swap(&on_break, &on_break).await.unwrap());
    }

    #[actix_web::test]
    async fn test_list_orders_by_date_descending() {
        let store = MemoryAttendanceStore::new();
        for d in [11, 9, 10] {
            store
                .insert(clock_in(1, d), at("2025-03-09T08:00:00Z"))
                .await
                .unwrap();
        }
        let dates: Vec<_> = store
            .list(&RecordFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.date)
            .collect();
        assert_eq!(dates, vec![day(11), day(10), day(9)]);
    }

    #[actix_web::test]
    async fn test_delete_day_is_idempotent() {
        let store = MemoryAttendanceStore::new();
        store
            .insert(clock_in(1, 10), at("2025-03-10T08:00:00Z"))
            .await
            .unwrap();
        assert_eq!(store.delete_day(1, day(10)).await.unwrap(), 1);
        assert_eq!(store.delete_day(1, day(10)).await.unwrap(), 0);
        assert!(store.find_day(1, day(10)).await.unwrap().is_none());
    }

    fn new_user(email: &str, role: Role) -> NewUser {
        NewUser {
            name: email.split('@').next().unwrap().to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role,
            area: None,
            department: None,
            schedule: None,
            break_duration: None,
            admin_contact: None,
        }
    }

    #[actix_web::test]
    async fn test_user_email_is_unique() {
        let store = MemoryUserStore::new();
        store.create(new_user("a@x.io", Role::Driver)).await.unwrap();
        let err = store
            .create(new_user("a@x.io", Role::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[actix_web::test]
    async fn test_driver_operations_skip_admins() {
        let store = MemoryUserStore::new();
        let admin = store.create(new_user("boss@x.io", Role::Admin)).await.unwrap();
        let driver = store.create(new_user("dee@x.io", Role::Driver)).await.unwrap();

        let changes = DriverChanges {
            area: Some("East".to_string()),
            ..Default::default()
        };
        assert!(store.update_driver(admin.id, &changes).await.unwrap().is_none());
        assert!(!store.delete_driver(admin.id).await.unwrap());

        let updated = store.update_driver(driver.id, &changes).await.unwrap().unwrap();
        assert_eq!(updated.area.as_deref(), Some("East"));

        let taken = DriverChanges {
            email: Some("boss@x.io".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.update_driver(driver.id, &taken).await,
            Err(AppError::Conflict(_))
        ));

        assert!(store.delete_driver(driver.id).await.unwrap());
        assert_eq!(store.list_by_role(Role::Driver).await.unwrap().len(), 0);
    }

    #[actix_web::test]
    async fn test_refresh_token_redeems_once() {
        let store = MemoryUserStore::new();
        let expires = Utc::now() + chrono::Duration::hours(1);
        store.store_refresh_token(1, "jti-1", expires).await.unwrap();
        assert!(store.revoke_refresh_token("jti-1").await.unwrap());
        assert!(!store.revoke_refresh_token("jti-1").await.unwrap());
        assert!(!store.revoke_refresh_token("unknown").await.unwrap());
    }

    #[actix_web::test]
    async fn test_deleting_driver_revokes_their_refresh_tokens() {
        let store = MemoryUserStore::new();
        let driver = store.create(new_user("dee@x.io", Role::Driver)).await.unwrap();
        let other = store.create(new_user("eve@x.io", Role::Driver)).await.unwrap();
        let expires = Utc::now() + chrono::Duration::hours(1);
        store.store_refresh_token(driver.id, "dee-1", expires).await.unwrap();
        store.store_refresh_token(other.id, "eve-1", expires).await.unwrap();

        assert!(store.delete_driver(driver.id).await.unwrap());

        assert!(!store.revoke_refresh_token("dee-1").await.unwrap());
        assert!(store.revoke_refresh_token("eve-1").await.unwrap());
    }

    #[actix_web::test]
    async fn test_task_listing_filters() {
        let store = MemoryTaskStore::new();
        let fields = |assigned_to| TaskFields {
            title: "Check tyres".to_string(),
            description: "All four".to_string(),
            priority: TaskPriority::Medium,
            due_date: day(15),
            assigned_to,
        };
        let first = store.create(fields(5), 1).await.unwrap();
        let second = store.create(fields(6), 1).await.unwrap();

        let all = store.list(TaskFilter::All).await.unwrap();
        assert_eq!(all.first().map(|t| t.id), Some(second.id));
        assert_eq!(store.list(TaskFilter::AssignedTo(5)).await.unwrap(), vec![first.clone()]);

        let done = store
            .set_status(first.id, TaskStatus::Completed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(store.delete(first.id).await.unwrap());
        assert!(!store.delete(first.id).await.unwrap());

        assert_eq!(store.delete_for_user(6).await.unwrap(), 1);
        assert!(store.list(TaskFilter::All).await.unwrap().is_empty());
    }
}
