use crate::accounting::DateRange;
use crate::api::{find_driver, user_summaries};
use crate::auth::auth::AuthUser;
use crate::error::AppResult;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, Location, Phase, Punch};
use crate::model::role::Role;
use crate::model::user::UserSummary;
use crate::state::AppState;
use actix_web::{HttpResponse, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

/// Flat wire form of an attendance record.
#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceView {
    pub id: u64,
    pub driver_id: u64,
    #[schema(value_type = String, format = Date, example = "2025-03-10")]
    pub date: NaiveDate,
    pub phase: Phase,
    pub clock_in: Punch,
    pub clock_out: Option<Punch>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub break_start: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub break_end: Option<DateTime<Utc>>,
    pub total_hours: f64,
    pub overtime_hours: f64,
    pub status: AttendanceStatus,
    /// Present on admin reports only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<UserSummary>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTime<Utc>,
}

impl From<AttendanceRecord> for AttendanceView {
    fn from(record: AttendanceRecord) -> Self {
        AttendanceView {
            id: record.id,
            driver_id: record.driver_id,
            date: record.date,
            phase: record.state.phase(),
            clock_in: *record.state.clock_in(),
            clock_out: record.state.clock_out().copied(),
            break_start: record.state.break_start(),
            break_end: record.state.break_end(),
            total_hours: record.hours.total,
            overtime_hours: record.hours.overtime,
            status: record.status,
            driver: None,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Records with the driver's name card attached.
async fn annotated(
    state: &AppState,
    records: Vec<AttendanceRecord>,
) -> AppResult<Vec<AttendanceView>> {
    let drivers = user_summaries(state, records.iter().map(|r| r.driver_id)).await?;

    Ok(records
        .into_iter()
        .map(|record| AttendanceView {
            driver: drivers.get(&record.driver_id).cloned(),
            ..record.into()
        })
        .collect())
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct HistoryQuery {
    /// Inclusive, YYYY-MM-DD
    #[param(value_type = Option<String>, format = Date)]
    pub start_date: Option<NaiveDate>,
    /// Inclusive, YYYY-MM-DD
    #[param(value_type = Option<String>, format = Date)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct RecordQuery {
    #[param(value_type = Option<String>, format = Date)]
    pub start_date: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = Date)]
    pub end_date: Option<NaiveDate>,
    pub driver_id: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SummaryQuery {
    /// Defaults to today
    #[param(value_type = Option<String>, format = Date)]
    pub date: Option<NaiveDate>,
}

/// A driver currently on shift.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveDriver {
    pub record_id: u64,
    pub driver_id: u64,
    pub driver: Option<UserSummary>,
    pub phase: Phase,
    pub clock_in: Punch,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub break_start: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub break_end: Option<DateTime<Utc>>,
    /// Clock-in location; no live tracking.
    pub last_location: Location,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct DailySummary {
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    pub total_drivers: usize,
    pub clocked_in: usize,
    pub on_break: usize,
    pub clocked_out: usize,
    /// Drivers with no record for the day
    pub absent: usize,
    pub total_hours: f64,
    pub overtime_hours: f64,
}

impl DailySummary {
    pub fn tally(date: NaiveDate, total_drivers: usize, records: &[AttendanceRecord]) -> Self {
        let mut summary = DailySummary {
            date,
            total_drivers,
            ..Default::default()
        };

        let mut seen = HashSet::new();
        for record in records {
            seen.insert(record.driver_id);
            match record.state.phase() {
                Phase::ClockedIn => summary.clocked_in += 1,
                Phase::OnBreak => summary.on_break += 1,
                Phase::ClockedOut => summary.clocked_out += 1,
            }
            summary.total_hours += record.hours.total;
            summary.overtime_hours += record.hours.overtime;
        }
        summary.absent = total_drivers.saturating_sub(seen.len());
        summary
    }
}

/// Clock in for today
#[utoipa::path(
    post,
    path = "/api/attendance/clock-in",
    request_body = Location,
    responses(
        (status = 201, description = "Clocked in", body = AttendanceView),
        (status = 400, description = "Already clocked in today or invalid location", body = Object, example = json!({
            "message": "Already clocked in today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Driver account no longer exists"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip(state, body), fields(driver_id = auth.user_id))]
pub async fn clock_in(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<Location>,
) -> AppResult<HttpResponse> {
    auth.require_driver()?;
    // The token can outlive the account
    find_driver(&state, auth.user_id).await?;

    let record = state
        .attendance
        .clock_in(auth.user_id, body.into_inner())
        .await?;

    Ok(HttpResponse::Created().json(AttendanceView::from(record)))
}

/// Clock out for today
#[utoipa::path(
    post,
    path = "/api/attendance/clock-out",
    request_body = Location,
    responses(
        (status = 200, description = "Clocked out, hours computed", body = AttendanceView),
        (status = 400, description = "No active clock-in found", body = Object, example = json!({
            "message": "No active clock-in found"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip(state, body), fields(driver_id = auth.user_id))]
pub async fn clock_out(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<Location>,
) -> AppResult<HttpResponse> {
    auth.require_driver()?;

    let record = state
        .attendance
        .clock_out(auth.user_id, body.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(AttendanceView::from(record)))
}

/// Start today's break
#[utoipa::path(
    post,
    path = "/api/attendance/break/start",
    responses(
        (status = 200, description = "Break started", body = AttendanceView),
        (status = 400, description = "Not clocked in, or break already taken", body = Object, example = json!({
            "message": "No active clock-in found"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip(state), fields(driver_id = auth.user_id))]
pub async fn start_break(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    auth.require_driver()?;

    let record = state.attendance.start_break(auth.user_id).await?;
    Ok(HttpResponse::Ok().json(AttendanceView::from(record)))
}

/// End today's break
#[utoipa::path(
    post,
    path = "/api/attendance/break/end",
    responses(
        (status = 200, description = "Break ended", body = AttendanceView),
        (status = 400, description = "No break in progress", body = Object, example = json!({
            "message": "No active break found"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip(state), fields(driver_id = auth.user_id))]
pub async fn end_break(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    auth.require_driver()?;

    let record = state.attendance.end_break(auth.user_id).await?;
    Ok(HttpResponse::Ok().json(AttendanceView::from(record)))
}

/// Caller's own attendance history, newest first
#[utoipa::path(
    get,
    path = "/api/attendance/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Attendance records", body = [AttendanceView]),
        (status = 400, description = "Invalid date range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip(state), fields(driver_id = auth.user_id))]
pub async fn history(
    auth: AuthUser,
    state: web::Data<AppState>,
    query: web::Query<HistoryQuery>,
) -> AppResult<HttpResponse> {
    auth.require_driver()?;

    let range = DateRange::new(query.start_date, query.end_date)?;
    let records = state.attendance.history(auth.user_id, range).await?;

    let views: Vec<AttendanceView> = records.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(views))
}

/// All drivers' records, newest first
#[utoipa::path(
    get,
    path = "/api/attendance/admin/records",
    params(RecordQuery),
    responses(
        (status = 200, description = "Attendance records with driver details", body = [AttendanceView]),
        (status = 400, description = "Invalid date range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip(state), fields(user_id = auth.user_id))]
pub async fn admin_records(
    auth: AuthUser,
    state: web::Data<AppState>,
    query: web::Query<RecordQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let range = DateRange::new(query.start_date, query.end_date)?;
    let records = state.attendance.records(range, query.driver_id).await?;

    Ok(HttpResponse::Ok().json(annotated(&state, records).await?))
}

/// Records with overtime, newest first
#[utoipa::path(
    get,
    path = "/api/attendance/admin/overtime",
    params(RecordQuery),
    responses(
        (status = 200, description = "Records where overtime_hours > 0", body = [AttendanceView]),
        (status = 400, description = "Invalid date range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip(state), fields(user_id = auth.user_id))]
pub async fn admin_overtime(
    auth: AuthUser,
    state: web::Data<AppState>,
    query: web::Query<RecordQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let range = DateRange::new(query.start_date, query.end_date)?;
    let records = state.attendance.overtime(range, query.driver_id).await?;

    Ok(HttpResponse::Ok().json(annotated(&state, records).await?))
}

/// Drivers clocked in today and not yet clocked out
#[utoipa::path(
    get,
    path = "/api/attendance/admin/active-drivers",
    responses(
        (status = 200, description = "Drivers on shift", body = [ActiveDriver]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip(state), fields(user_id = auth.user_id))]
pub async fn active_drivers(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let records = state.attendance.active().await?;
    let drivers = user_summaries(&state, records.iter().map(|r| r.driver_id)).await?;

    let active: Vec<ActiveDriver> = records
        .into_iter()
        .map(|record| {
            let clock_in = *record.state.clock_in();
            ActiveDriver {
                record_id: record.id,
                driver_id: record.driver_id,
                driver: drivers.get(&record.driver_id).cloned(),
                phase: record.state.phase(),
                clock_in,
                break_start: record.state.break_start(),
                break_end: record.state.break_end(),
                last_location: clock_in.location,
            }
        })
        .collect();

    Ok(HttpResponse::Ok().json(active))
}

/// Head counts and hours for one day
#[utoipa::path(
    get,
    path = "/api/attendance/admin/summary",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Daily summary", body = DailySummary),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip(state), fields(user_id = auth.user_id))]
pub async fn daily_summary(
    auth: AuthUser,
    state: web::Data<AppState>,
    query: web::Query<SummaryQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let date = query.date.unwrap_or_else(|| state.attendance.today());
    let records = state.attendance.on_day(date).await?;
    let total_drivers = state.users.list_by_role(Role::Driver).await?.len();

    Ok(HttpResponse::Ok().json(DailySummary::tally(date, total_drivers, &records)))
}

/// Delete the caller's record for today
#[utoipa::path(
    delete,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's record removed (or there was none)", body = Object, example = json!({
            "message": "Today's attendance has been reset",
            "removed": 1
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip(state), fields(user_id = auth.user_id))]
pub async fn reset_today(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let removed = state.attendance.reset_today(auth.user_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Today's attendance has been reset",
        "removed": removed
    })))
}
