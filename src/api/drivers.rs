use crate::api::find_driver;
use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::model::role::Role;
use crate::model::user::{DriverChanges, User, UserProfile};
use crate::state::AppState;
use actix_web::{HttpResponse, web};
use tracing::{info, instrument};

fn profiles(users: Vec<User>) -> Vec<UserProfile> {
    users.iter().filter_map(User::profile).collect()
}

/// List drivers
#[utoipa::path(
    get,
    path = "/api/drivers",
    responses(
        (status = 200, description = "Drivers sorted by name", body = [UserProfile]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Drivers"
)]
#[instrument(skip(state), fields(user_id = auth.user_id))]
pub async fn list_drivers(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let drivers = state.users.list_by_role(Role::Driver).await?;
    Ok(HttpResponse::Ok().json(profiles(drivers)))
}

/// Get a driver
#[utoipa::path(
    get,
    path = "/api/drivers/{id}",
    params(
        ("id" = u64, Path, description = "Driver ID")
    ),
    responses(
        (status = 200, description = "Driver profile", body = UserProfile),
        (status = 404, description = "Driver not found", body = Object, example = json!({
            "message": "Driver not found"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Drivers"
)]
#[instrument(skip(state), fields(user_id = auth.user_id))]
pub async fn get_driver(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let driver = find_driver(&state, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(driver.profile()))
}

/// Update a driver's profile
#[utoipa::path(
    put,
    path = "/api/drivers/{id}",
    params(
        ("id" = u64, Path, description = "Driver ID")
    ),
    request_body = DriverChanges,
    responses(
        (status = 200, description = "Driver updated", body = UserProfile),
        (status = 400, description = "Invalid field value"),
        (status = 404, description = "Driver not found"),
        (status = 409, description = "Email already registered"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Drivers"
)]
#[instrument(skip(state, body), fields(user_id = auth.user_id))]
pub async fn update_driver(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<u64>,
    body: web::Json<DriverChanges>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let id = path.into_inner();
    let changes = body.into_inner().normalized()?;
    let previous = find_driver(&state, id).await?;

    let driver = state
        .users
        .update_driver(id, &changes)
        .await?
        .ok_or(AppError::NotFound("Driver"))?;

    if previous.email != driver.email {
        state.email_filter.remove(&previous.email);
        state.email_filter.insert(&driver.email);
    }
    state.user_cache.put(driver.summary()).await;

    info!(driver_id = id, "Driver updated");
    Ok(HttpResponse::Ok().json(driver.profile()))
}

/// Delete a driver along with their attendance and tasks
#[utoipa::path(
    delete,
    path = "/api/drivers/{id}",
    params(
        ("id" = u64, Path, description = "Driver ID")
    ),
    responses(
        (status = 200, description = "Driver deleted", body = Object, example = json!({
            "message": "Driver deleted successfully"
        })),
        (status = 404, description = "Driver not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Drivers"
)]
#[instrument(skip(state), fields(user_id = auth.user_id))]
pub async fn delete_driver(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let id = path.into_inner();
    let driver = find_driver(&state, id).await?;

    let removed_records = state.attendance.purge_driver(id).await?;
    let removed_tasks = state.tasks.delete_for_user(id).await?;
    if !state.users.delete_driver(id).await? {
        return Err(AppError::NotFound("Driver"));
    }

    state.user_cache.invalidate(id).await;
    state.email_filter.remove(&driver.email);

    info!(driver_id = id, removed_records, removed_tasks, "Driver deleted");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Driver deleted successfully"
    })))
}
