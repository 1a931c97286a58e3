use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{patch, post},
    Json, Router,
};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{
        ForgotPasswordRequest, LoginRequest, MessageResponse, ResetPasswordRequest,
        SignupRequest, TokenResponse, UpdatePasswordRequest,
    },
    middleware::{protect, CurrentUser},
    reset::{hash_reset_token, issue_reset_token},
    services::{normalize_email, password_changed_now, validate_name, validate_new_password},
};
use crate::{
    error::AppError,
    extract::JsonBody,
    mail::Email,
    state::AppState,
    users::model::{NewUser, Role},
};

pub const BAD_CREDENTIALS: &str = "Incorrect email or password";
pub const MISSING_CREDENTIALS: &str = "Please provide email and password";
pub const WRONG_CURRENT_PASSWORD: &str = "Your current password is wrong";
pub const INVALID_RESET_TOKEN: &str = "Password reset link is invalid or has expired";
pub const MAIL_FAILED: &str = "There was an error sending the email. Try again later!";
pub const RESET_SENT: &str = "If that email is registered, a reset link has been sent to it";

pub fn auth_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/users/updatePassword", patch(update_password))
        .route_layer(middleware::from_fn_with_state(state, protect));

    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/forgotPassword", post(forgot_password))
        .route("/users/resetPassword", patch(reset_password))
        .merge(protected)
}

fn issue_token(state: &AppState, user_id: uuid::Uuid) -> Result<Json<TokenResponse>, AppError> {
    let token = state.tokens.issue_access_token(user_id).map_err(|e| {
        error!(error = %e, user_id = %user_id, "jwt sign access failed");
        AppError::from(e)
    })?;
    Ok(Json(TokenResponse::new(token)))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    let name = validate_name(&payload.name)?;
    let email = normalize_email(&payload.email)?;
    validate_new_password(&payload.password, &payload.confirm_password)?;

    let password_hash = state.passwords.hash(payload.password).await?;
    let user = state
        .users
        .insert(NewUser {
            name,
            email,
            password_hash,
            role: Role::User,
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "signup insert failed");
            AppError::from(e)
        })?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, issue_token(&state, user.id)?))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let (Some(email), Some(password)) = (payload.email, payload.password) else {
        return Err(AppError::validation(MISSING_CREDENTIALS));
    };
    let email = email.trim().to_lowercase();
    if email.is_empty() || password.is_empty() {
        return Err(AppError::validation(MISSING_CREDENTIALS));
    }

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::authentication(BAD_CREDENTIALS));
    };

    if !state.passwords.verify(password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::authentication(BAD_CREDENTIALS));
    }

    info!(user_id = %user.id, "user logged in");
    issue_token(&state, user.id)
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = normalize_email(&payload.email)?;
    let sent = Json(MessageResponse {
        status: "success",
        message: RESET_SENT,
    });

    let Some(user) = state.users.find_by_email(&email).await? else {
        info!("password reset requested for unknown email");
        return Ok(sent);
    };

    let reset = issue_reset_token(Duration::minutes(state.config.reset_token_ttl_minutes));
    state
        .users
        .set_reset_token(user.id, &reset.hash, reset.expires_at)
        .await?;

    let link = format!(
        "{}/api/v1/users/resetPassword?token={}",
        state.config.public_url.trim_end_matches('/'),
        reset.raw
    );
    let email = Email {
        to: user.email.clone(),
        subject: format!(
            "Your password reset token (valid for {} minutes)",
            state.config.reset_token_ttl_minutes
        ),
        text: format!(
            "Forgot your password? Submit a PATCH request with your new password and \
             confirmPassword, and this token, to: {link}\n\
             If you didn't forget your password, please ignore this email."
        ),
    };

    if let Err(e) = state.mailer.send(email).await {
        // The persisted token stays valid until it expires.
        error!(error = ?e, user_id = %user.id, "reset email delivery failed");
        return Err(AppError::Internal(MAIL_FAILED.into()));
    }

    info!(user_id = %user.id, "password reset email sent");
    Ok(sent)
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let raw = payload.token.trim();
    if raw.is_empty() {
        return Err(AppError::authentication(INVALID_RESET_TOKEN));
    }

    validate_new_password(&payload.password, &payload.confirm_password)?;
    let password_hash = state.passwords.hash(payload.password).await?;

    let hash = hash_reset_token(raw);
    let Some(user) = state
        .users
        .consume_reset_token(
            &hash,
            OffsetDateTime::now_utc(),
            &password_hash,
            password_changed_now(),
        )
        .await?
    else {
        warn!("reset token unknown or expired");
        return Err(AppError::authentication(INVALID_RESET_TOKEN));
    };

    info!(user_id = %user.id, "password reset");
    issue_token(&state, user.id)
}

#[instrument(skip(state, payload, current), fields(user_id = %current.0.id))]
pub async fn update_password(
    State(state): State<AppState>,
    current: CurrentUser,
    JsonBody(payload): JsonBody<UpdatePasswordRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let CurrentUser(user) = current;

    if !state
        .passwords
        .verify(payload.current_password, user.password_hash.clone())
        .await?
    {
        warn!(user_id = %user.id, "wrong current password");
        return Err(AppError::authentication(WRONG_CURRENT_PASSWORD));
    }

    validate_new_password(&payload.password, &payload.confirm_password)?;
    let password_hash = state.passwords.hash(payload.password).await?;
    state
        .users
        .set_password(user.id, &password_hash, password_changed_now())
        .await?;

    info!(user_id = %user.id, "password updated");
    issue_token(&state, user.id)
}
