use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::model::role::Role;

pub const DEFAULT_SCHEDULE_START: &str = "08:00";
pub const DEFAULT_SCHEDULE_END: &str = "17:00";
/// Minutes
pub const DEFAULT_BREAK_DURATION: u32 = 60;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: u8,
    pub area: Option<String>,
    pub department: Option<String>,
    pub schedule_start: Option<String>,
    pub schedule_end: Option<String>,
    pub break_duration: Option<u32>,
    pub admin_contact: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Schedule {
    #[schema(example = "08:00")]
    pub start: String,
    #[schema(example = "17:00")]
    pub end: String,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            start: DEFAULT_SCHEDULE_START.to_string(),
            end: DEFAULT_SCHEDULE_END.to_string(),
        }
    }
}

impl Schedule {
    /// Both ends must be `HH:MM`.
    pub fn validated(self) -> AppResult<Self> {
        for value in [&self.start, &self.end] {
            NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| {
                AppError::validation(format!("schedule time '{value}' must be HH:MM"))
            })?;
        }
        Ok(self)
    }
}

/// Public view of a user; never carries the password hash.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub area: Option<String>,
    pub department: Option<String>,
    pub schedule: Option<Schedule>,
    /// Minutes
    pub break_duration: Option<u32>,
    pub admin_contact: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

/// Name card attached to attendance reports and tasks.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub area: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub area: Option<String>,
    pub department: Option<String>,
    pub schedule: Option<Schedule>,
    pub break_duration: Option<u32>,
    pub admin_contact: Option<String>,
}

/// Partial update of a driver's profile. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DriverChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub area: Option<String>,
    pub department: Option<String>,
    pub schedule: Option<Schedule>,
    pub break_duration: Option<u32>,
    pub admin_contact: Option<String>,
}

impl DriverChanges {
    /// Trims text fields, lowercases the email and rejects blanks.
    pub fn normalized(self) -> AppResult<Self> {
        fn non_blank(field: &str, value: Option<String>) -> AppResult<Option<String>> {
            match value.map(|v| v.trim().to_string()) {
                Some(v) if v.is_empty() => Err(AppError::validation(format!("{field} must not be empty"))),
                other => Ok(other),
            }
        }

        let email = non_blank("email", self.email)?.map(|e| e.to_lowercase());
        if let Some(email) = &email {
            validate_email(email)?;
        }

        Ok(Self {
            name: non_blank("name", self.name)?,
            email,
            area: non_blank("area", self.area)?,
            department: non_blank("department", self.department)?,
            schedule: self.schedule.map(Schedule::validated).transpose()?,
            break_duration: self.break_duration,
            admin_contact: non_blank("admin_contact", self.admin_contact)?,
        })
    }
}

pub fn validate_email(email: &str) -> AppResult<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AppError::validation("a valid email is required")),
    }
}

impl User {
    pub fn role(&self) -> Option<Role> {
        Role::from_id(self.role_id)
    }

    pub fn is_driver(&self) -> bool {
        self.role() == Some(Role::Driver)
    }

    pub fn schedule(&self) -> Option<Schedule> {
        match (&self.schedule_start, &self.schedule_end) {
            (Some(start), Some(end)) => Some(Schedule {
                start: start.clone(),
                end: end.clone(),
            }),
            _ => None,
        }
    }

    pub fn apply(&mut self, changes: &DriverChanges) {
        if let Some(name) = &changes.name {
            self.name = name.clone();
        }
        if let Some(email) = &changes.email {
            self.email = email.clone();
        }
        if let Some(area) = &changes.area {
            self.area = Some(area.clone());
        }
        if let Some(department) = &changes.department {
            self.department = Some(department.clone());
        }
        if let Some(schedule) = &changes.schedule {
            self.schedule_start = Some(schedule.start.clone());
            self.schedule_end = Some(schedule.end.clone());
        }
        if let Some(minutes) = changes.break_duration {
            self.break_duration = Some(minutes);
        }
        if let Some(contact) = &changes.admin_contact {
            self.admin_contact = Some(contact.clone());
        }
    }

    pub fn profile(&self) -> Option<UserProfile> {
        Some(UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role()?,
            area: self.area.clone(),
            department: self.department.clone(),
            schedule: self.schedule(),
            break_duration: self.break_duration,
            admin_contact: self.admin_contact.clone(),
            created_at: self.created_at,
        })
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            area: self.area.clone(),
            department: self.department.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> User {
        User {
            id: 3,
            name: "Dana Reyes".to_string(),
            email: "dana@fleet.test".to_string(),
            password_hash: "hash".to_string(),
            role_id: Role::Driver.id(),
            area: Some("North".to_string()),
            department: Some("Deliveries".to_string()),
            schedule_start: Some("08:00".to_string()),
            schedule_end: Some("17:00".to_string()),
            break_duration: Some(60),
            admin_contact: Some("ops@fleet.test".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_only_touches_given_fields() {
        let mut user = driver();
        user.apply(&DriverChanges {
            area: Some("South".to_string()),
            schedule: Some(Schedule {
                start: "06:00".to_string(),
                end: "14:00".to_string(),
            }),
            ..Default::default()
        });

        assert_eq!(user.area.as_deref(), Some("South"));
        assert_eq!(user.schedule_start.as_deref(), Some("06:00"));
        assert_eq!(user.name, "Dana Reyes");
        assert_eq!(user.break_duration, Some(60));
    }

    #[test]
    fn test_normalized_changes() {
        let changes = DriverChanges {
            email: Some("  Dana.R@Fleet.Test ".to_string()),
            name: Some(" Dana ".to_string()),
            ..Default::default()
        }
        .normalized()
        .unwrap();
        assert_eq!(changes.email.as_deref(), Some("dana.r@fleet.test"));
        assert_eq!(changes.name.as_deref(), Some("Dana"));

        let blank = DriverChanges {
            area: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(blank.normalized(), Err(AppError::Validation(_))));

        let bad_schedule = DriverChanges {
            schedule: Some(Schedule {
                start: "8am".to_string(),
                end: "17:00".to_string(),
            }),
            ..Default::default()
        };
        assert!(matches!(bad_schedule.normalized(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_profile_hides_password() {
        let profile = driver().profile().unwrap();
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "driver");
        assert_eq!(json["schedule"]["start"], "08:00");
    }

    #[test]
    fn test_email_shape() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("nobody").is_err());
        assert!(validate_email("@b.co").is_err());
        assert!(validate_email("a@localhost").is_err());
    }
}
