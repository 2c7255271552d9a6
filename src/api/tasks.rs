use crate::api::user_summaries;
use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::model::task::{Task, TaskFields, TaskFilter, TaskPriority, TaskStatus};
use crate::model::user::UserSummary;
use crate::state::AppState;
use actix_web::{HttpResponse, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskPayload {
    #[schema(example = "Deliver pallets to depot 4")]
    pub title: String,
    pub description: String,
    /// low | medium | high
    #[schema(example = "medium")]
    pub priority: String,
    #[schema(value_type = String, format = Date, example = "2025-03-14")]
    pub due_date: NaiveDate,
    /// Driver ID
    pub assigned_to: u64,
}

impl TaskPayload {
    fn into_fields(self) -> AppResult<TaskFields> {
        let title = self.title.trim().to_string();
        let description = self.description.trim().to_string();
        if title.is_empty() || description.is_empty() {
            return Err(AppError::validation("title and description are required"));
        }

        let priority: TaskPriority = self
            .priority
            .trim()
            .to_lowercase()
            .parse()
            .map_err(|_| AppError::validation("priority must be one of low, medium, high"))?;

        Ok(TaskFields {
            title,
            description,
            priority,
            due_date: self.due_date,
            assigned_to: self.assigned_to,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusPayload {
    pub status: TaskStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskView {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    #[schema(value_type = String, format = Date)]
    pub due_date: NaiveDate,
    pub assigned_to: u64,
    pub created_by: u64,
    pub assignee: Option<UserSummary>,
    pub creator: Option<UserSummary>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTime<Utc>,
}

async fn views(state: &AppState, tasks: Vec<Task>) -> AppResult<Vec<TaskView>> {
    let people = user_summaries(
        state,
        tasks.iter().flat_map(|t| [t.assigned_to, t.created_by]),
    )
    .await?;

    Ok(tasks
        .into_iter()
        .map(|task| TaskView {
            assignee: people.get(&task.assigned_to).cloned(),
            creator: people.get(&task.created_by).cloned(),
            id: task.id,
            title: task.title,
            description: task.description,
            priority: task.priority,
            status: task.status,
            due_date: task.due_date,
            assigned_to: task.assigned_to,
            created_by: task.created_by,
            created_at: task.created_at,
            updated_at: task.updated_at,
        })
        .collect())
}

async fn view(state: &AppState, task: Task) -> AppResult<TaskView> {
    views(state, vec![task])
        .await?
        .pop()
        .ok_or(AppError::NotFound("Task"))
}

async fn list(state: &AppState, filter: TaskFilter) -> AppResult<HttpResponse> {
    let tasks = state.tasks.list(filter).await?;
    Ok(HttpResponse::Ok().json(views(state, tasks).await?))
}

async fn ensure_assignee_is_driver(state: &AppState, user_id: u64) -> AppResult<()> {
    match state.users.find_by_id(user_id).await? {
        Some(user) if user.is_driver() => Ok(()),
        _ => Err(AppError::validation("assigned_to must be an existing driver")),
    }
}

/// Tasks the caller created
#[utoipa::path(
    get,
    path = "/api/tasks/my-tasks",
    responses(
        (status = 200, description = "Tasks, newest first", body = [TaskView]),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
#[instrument(skip(state), fields(user_id = auth.user_id))]
pub async fn my_tasks(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    list(&state, TaskFilter::CreatedBy(auth.user_id)).await
}

/// Tasks assigned to the caller
#[utoipa::path(
    get,
    path = "/api/tasks/assigned",
    responses(
        (status = 200, description = "Tasks, newest first", body = [TaskView]),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
#[instrument(skip(state), fields(user_id = auth.user_id))]
pub async fn assigned_tasks(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    list(&state, TaskFilter::AssignedTo(auth.user_id)).await
}

/// All tasks
#[utoipa::path(
    get,
    path = "/api/tasks",
    responses(
        (status = 200, description = "Tasks, newest first", body = [TaskView]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
#[instrument(skip(state), fields(user_id = auth.user_id))]
pub async fn list_tasks(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    list(&state, TaskFilter::All).await
}

/// Get one task
#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    params(
        ("id" = u64, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task", body = TaskView),
        (status = 403, description = "Not the creator, assignee or an admin"),
        (status = 404, description = "Task not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
#[instrument(skip(state), fields(user_id = auth.user_id))]
pub async fn get_task(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let task = state
        .tasks
        .find(path.into_inner())
        .await?
        .ok_or(AppError::NotFound("Task"))?;

    if !task.visible_to(auth.user_id, auth.is_admin()) {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }

    Ok(HttpResponse::Ok().json(view(&state, task).await?))
}

/// Create a task
#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = TaskPayload,
    responses(
        (status = 201, description = "Task created", body = TaskView),
        (status = 400, description = "Invalid payload", body = Object, example = json!({
            "message": "priority must be one of low, medium, high"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
#[instrument(skip(state, body), fields(user_id = auth.user_id))]
pub async fn create_task(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<TaskPayload>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let fields = body.into_inner().into_fields()?;
    ensure_assignee_is_driver(&state, fields.assigned_to).await?;

    let task = state.tasks.create(fields, auth.user_id).await?;
    info!(task_id = task.id, assigned_to = task.assigned_to, "Task created");

    Ok(HttpResponse::Created().json(view(&state, task).await?))
}

/// Replace a task's editable fields
#[utoipa::path(
    put,
    path = "/api/tasks/{id}",
    params(
        ("id" = u64, Path, description = "Task ID")
    ),
    request_body = TaskPayload,
    responses(
        (status = 200, description = "Task updated", body = TaskView),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Task not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
#[instrument(skip(state, body), fields(user_id = auth.user_id))]
pub async fn update_task(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<u64>,
    body: web::Json<TaskPayload>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let fields = body.into_inner().into_fields()?;
    ensure_assignee_is_driver(&state, fields.assigned_to).await?;

    let task = state
        .tasks
        .update(path.into_inner(), &fields)
        .await?
        .ok_or(AppError::NotFound("Task"))?;

    Ok(HttpResponse::Ok().json(view(&state, task).await?))
}

/// Delete a task
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    params(
        ("id" = u64, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task deleted", body = Object, example = json!({
            "message": "Task deleted successfully"
        })),
        (status = 404, description = "Task not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
#[instrument(skip(state), fields(user_id = auth.user_id))]
pub async fn delete_task(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    if !state.tasks.delete(path.into_inner()).await? {
        return Err(AppError::NotFound("Task"));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Task deleted successfully"
    })))
}

/// Move a task to another status
#[utoipa::path(
    patch,
    path = "/api/tasks/{id}/status",
    params(
        ("id" = u64, Path, description = "Task ID")
    ),
    request_body = StatusPayload,
    responses(
        (status = 200, description = "Status updated", body = TaskView),
        (status = 403, description = "Not the creator, assignee or an admin"),
        (status = 404, description = "Task not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
#[instrument(skip(state, body), fields(user_id = auth.user_id))]
pub async fn update_status(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<u64>,
    body: web::Json<StatusPayload>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let task = state
        .tasks
        .find(id)
        .await?
        .ok_or(AppError::NotFound("Task"))?;

    if !task.visible_to(auth.user_id, auth.is_admin()) {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }

    let task = state
        .tasks
        .set_status(id, body.status)
        .await?
        .ok_or(AppError::NotFound("Task"))?;

    info!(task_id = id, status = %task.status, "Task status changed");
    Ok(HttpResponse::Ok().json(view(&state, task).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(title: &str, priority: &str) -> TaskPayload {
        TaskPayload {
            title: title.to_string(),
            description: "Bring the signed manifest back".to_string(),
            priority: priority.to_string(),
            due_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            assigned_to: 2,
        }
    }

    #[test]
    fn test_payload_validation() {
        let fields = payload("  Depot run ", "High").into_fields().unwrap();
        assert_eq!(fields.title, "Depot run");
        assert_eq!(fields.priority, TaskPriority::High);

        assert!(matches!(
            payload("   ", "low").into_fields(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            payload("Depot run", "urgent").into_fields(),
            Err(AppError::Validation(_))
        ));
    }
}
