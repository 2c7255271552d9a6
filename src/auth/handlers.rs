use crate::{
    auth::{
        auth::bearer_token,
        jwt::{TokenType, generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{AppError, AppResult},
    model::{
        role::Role,
        user::{
            DEFAULT_BREAK_DURATION, NewUser, Schedule, User, UserProfile, validate_email,
        },
    },
    state::AppState,
    store::UserStore,
};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Dana Reyes")]
    pub name: String,
    #[schema(example = "dana@fleet.test")]
    pub email: String,
    pub password: String,
    pub role: Role,
    pub area: Option<String>,
    pub department: Option<String>,
    pub schedule: Option<Schedule>,
    /// Minutes
    pub break_duration: Option<u32>,
    pub admin_contact: Option<String>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RegisterRequest {
    /// Normalizes the payload into a user row. The password hash is left
    /// empty for the caller to fill in.
    fn into_new_user(self) -> AppResult<NewUser> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("name must not be empty"));
        }

        let email = self.email.trim().to_lowercase();
        validate_email(&email)?;

        let area = trimmed(self.area);
        let department = trimmed(self.department);
        let admin_contact = trimmed(self.admin_contact);

        let (schedule, break_duration) = match self.role {
            Role::Driver => {
                if area.is_none() || department.is_none() || admin_contact.is_none() {
                    return Err(AppError::validation(
                        "drivers require area, department and admin_contact",
                    ));
                }
                let schedule = self.schedule.unwrap_or_default().validated()?;
                (
                    Some(schedule),
                    Some(self.break_duration.unwrap_or(DEFAULT_BREAK_DURATION)),
                )
            }
            Role::Admin => (
                self.schedule.map(Schedule::validated).transpose()?,
                self.break_duration,
            ),
        };

        Ok(NewUser {
            name,
            email,
            password_hash: String::new(),
            role: self.role,
            area,
            department,
            schedule,
            break_duration,
            admin_contact,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserProfile,
}

/// true  => email AVAILABLE
/// false => email TAKEN
async fn is_email_available(email: &str, state: &AppState) -> AppResult<bool> {
    // Cuckoo filter: a miss is definitive
    if !state.email_filter.might_exist(email) {
        return Ok(true);
    }

    Ok(state.users.find_by_email(email).await?.is_none())
}

/// Issues an access token and a stored refresh token.
async fn issue_tokens(
    user_id: u64,
    email: &str,
    role: u8,
    users: &dyn UserStore,
    config: &Config,
) -> AppResult<TokenPair> {
    let internal = |e: jsonwebtoken::errors::Error| AppError::Internal(e.to_string());

    let access_token = generate_access_token(
        user_id,
        email,
        role,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(internal)?;

    let (refresh_token, refresh_claims) = generate_refresh_token(
        user_id,
        email,
        role,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(internal)?;

    debug!(user_id, jti = %refresh_claims.jti, "Storing refresh token");
    users
        .store_refresh_token(user_id, &refresh_claims.jti, refresh_claims.expires_at())
        .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Register a driver or admin account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Invalid payload", body = Object, example = json!({
            "message": "drivers require area, department and admin_contact"
        })),
        (status = 409, description = "Email already registered", body = Object, example = json!({
            "message": "Email already registered"
        }))
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(state, body), fields(email = %body.email))]
pub async fn register(
    body: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();

    if body.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password = body.password.clone();
    let mut new_user = body.into_new_user()?;

    if !is_email_available(&new_user.email, &state).await? {
        info!("Registration rejected: email taken");
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    new_user.password_hash = hash_password(&password).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        AppError::Internal(e.to_string())
    })?;

    // The store's unique key settles races between concurrent registrations
    let user = state.users.create(new_user).await?;

    state.email_filter.insert(&user.email);
    state.user_cache.put(user.summary()).await;

    let profile = user
        .profile()
        .ok_or_else(|| AppError::Internal("Stored user has an unknown role".to_string()))?;

    info!(user_id = user.id, role = %profile.role, "User registered");
    Ok(HttpResponse::Created().json(RegisterResponse {
        message: "User registered successfully".to_string(),
        user: profile,
    }))
}

/// Exchange credentials for a token pair
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials", body = Object, example = json!({
            "message": "Invalid credentials"
        }))
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(state, config, body), fields(email = %body.email))]
pub async fn login(
    body: web::Json<LoginRequest>,
    state: web::Data<AppState>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Login request received");

    let email = body.email.trim().to_lowercase();
    if email.is_empty() || body.password.is_empty() {
        return Err(AppError::validation("Email and password required"));
    }

    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let user: User = match state.users.find_by_email(&email).await? {
        Some(user) => user,
        None => {
            info!("Invalid credentials: user not found");
            return Err(invalid());
        }
    };

    if let Err(e) = verify_password(&body.password, &user.password_hash) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(invalid());
    }

    let profile = user.profile().ok_or_else(invalid)?;
    let tokens = issue_tokens(
        user.id,
        &user.email,
        user.role_id,
        state.users.as_ref(),
        &config,
    )
    .await?;

    info!(user_id = user.id, "Login successful");
    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: profile,
    }))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Refresh token invalid, expired or already used")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_refresh", skip_all)]
pub async fn refresh_token(
    req: HttpRequest,
    state: web::Data<AppState>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let unauthorized = || AppError::Unauthorized("Invalid refresh token".to_string());

    let token = bearer_token(&req).ok_or_else(unauthorized)?;
    let claims = verify_token(token, &config.jwt_secret).map_err(|_| unauthorized())?;

    if claims.token_type != TokenType::Refresh {
        return Err(unauthorized());
    }

    // Revoking first makes each refresh token single-use
    if !state.users.revoke_refresh_token(&claims.jti).await? {
        info!(user_id = claims.user_id, "Refresh token reuse or unknown jti");
        return Err(unauthorized());
    }

    let tokens = issue_tokens(
        claims.user_id,
        &claims.sub,
        claims.role,
        state.users.as_ref(),
        &config,
    )
    .await?;

    Ok(HttpResponse::Ok().json(tokens))
}

/// Revoke a refresh token. Always succeeds.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logged out")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    state: web::Data<AppState>,
    config: web::Data<Config>,
) -> HttpResponse {
    let claims = bearer_token(&req)
        .and_then(|token| verify_token(token, &config.jwt_secret).ok())
        .filter(|claims| claims.token_type == TokenType::Refresh);

    if let Some(claims) = claims {
        if let Err(e) = state.users.revoke_refresh_token(&claims.jti).await {
            error!(error = %e, "Failed to revoke refresh token");
        }
    }

    HttpResponse::NoContent().finish()
}
