use crate::api::attendance::{ActiveDriver, AttendanceView, DailySummary};
use crate::api::tasks::{StatusPayload, TaskPayload, TaskView};
use crate::auth::handlers::{
    LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, TokenPair,
};
use crate::model::attendance::{AttendanceStatus, Location, Phase, Punch};
use crate::model::role::Role;
use crate::model::task::{TaskPriority, TaskStatus};
use crate::model::user::{DriverChanges, Schedule, UserProfile, UserSummary};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fleet Attendance API",
        version = "1.0.0",
        description = r#"
## Fleet Attendance & Task Tracking

Drivers clock in and out with their location, take one break a day and
receive tasks. Administrators review attendance, overtime and who is on
shift right now.

### Key Features
- **Attendance**
  - Clock in / clock out with latitude and longitude
  - One break per day; hours and overtime computed at clock-out
  - History, admin records, overtime report, active drivers, daily summary
- **Drivers**
  - List, view, update and delete driver profiles
- **Tasks**
  - Create, assign and track tasks for drivers

### Security
All `/api` endpoints require a **JWT Bearer access token** from `/auth/login`.
Admin-only endpoints answer `403` for drivers.

### Errors
Every error body is `{"message": "..."}`.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::attendance::clock_in,
        crate::api::attendance::clock_out,
        crate::api::attendance::start_break,
        crate::api::attendance::end_break,
        crate::api::attendance::history,
        crate::api::attendance::admin_records,
        crate::api::attendance::admin_overtime,
        crate::api::attendance::active_drivers,
        crate::api::attendance::daily_summary,
        crate::api::attendance::reset_today,

        crate::api::drivers::list_drivers,
        crate::api::drivers::get_driver,
        crate::api::drivers::update_driver,
        crate::api::drivers::delete_driver,

        crate::api::tasks::my_tasks,
        crate::api::tasks::assigned_tasks,
        crate::api::tasks::list_tasks,
        crate::api::tasks::get_task,
        crate::api::tasks::create_task,
        crate::api::tasks::update_task,
        crate::api::tasks::delete_task,
        crate::api::tasks::update_status
    ),
    components(
        schemas(
            RegisterRequest,
            RegisterResponse,
            LoginRequest,
            LoginResponse,
            TokenPair,
            Role,
            Schedule,
            UserProfile,
            UserSummary,
            DriverChanges,
            Location,
            Punch,
            Phase,
            AttendanceStatus,
            AttendanceView,
            ActiveDriver,
            DailySummary,
            TaskPriority,
            TaskStatus,
            TaskPayload,
            StatusPayload,
            TaskView
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and token rotation"),
        (name = "Attendance", description = "Clock in/out, breaks and attendance reports"),
        (name = "Drivers", description = "Driver management APIs"),
        (name = "Tasks", description = "Task assignment and tracking APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/api/attendance/clock-in"));
        assert!(paths.contains_key("/api/attendance/admin/summary"));
        assert!(paths.contains_key("/api/tasks/{id}/status"));
        assert!(paths.contains_key("/auth/login"));

        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
