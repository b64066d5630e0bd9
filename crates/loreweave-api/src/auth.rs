use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};
use uuid::Uuid;

use loreweave_db::Rejection;
use loreweave_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, ResendCodeRequest,
    VerifyEmailRequest,
};

use crate::error::ApiError;
use crate::state::AppState;

const TOKEN_LIFETIME_DAYS: i64 = 30;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();
    validate_username(&username)?;
    validate_email(&email)?;
    validate_password(&req.password)?;

    let user_id = Uuid::new_v4();
    let (uname, mail, password) = (username.clone(), email.clone(), req.password);
    state
        .with_db(move |db| {
            let hash = hash_password(&password)?;
            db.register_user(&user_id.to_string(), &uname, &mail, &hash)?;
            Ok::<_, ApiError>(())
        })
        .await?;

    info!("{} registered, awaiting verification", username);
    send_code(&state, &email);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            verification_required: true,
        }),
    ))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<StatusCode, ApiError> {
    let email = req.email.trim().to_lowercase();
    if !state.codes.verify(&email, &req.code) {
        return Err(ApiError::InvalidCode);
    }

    let enabled = state
        .with_db({
            let email = email.clone();
            move |db| db.enable_user_by_email(&email)
        })
        .await?;
    if !enabled {
        return Err(Rejection::NotFound("user").into());
    }

    info!("{} verified", email);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn resend_code(
    State(state): State<AppState>,
    Json(req): Json<ResendCodeRequest>,
) -> Result<StatusCode, ApiError> {
    let email = req.email.trim().to_lowercase();
    let user = state
        .with_db({
            let email = email.clone();
            move |db| db.get_user_by_email(&email)
        })
        .await?
        .ok_or(Rejection::NotFound("user"))?;

    if user.enabled {
        return Err(Rejection::InvalidInput("account is already verified").into());
    }

    send_code(&state, &email);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let username = req.username.trim().to_string();
    let user = state
        .with_db(move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let hash = user.password.clone();
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    if !valid {
        return Err(ApiError::Unauthorized);
    }
    if !user.enabled {
        return Err(ApiError::Unverified);
    }

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;
    let token = create_token(&state.jwt_secret, user_id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp()
            as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_token(secret: &str, token: &str) -> jsonwebtoken::errors::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Argon2id with a random salt, PHC string format.
pub(crate) fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("stored password hash is unreadable: {}", e);
            false
        }
    }
}

pub(crate) fn validate_username(username: &str) -> Result<(), Rejection> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(Rejection::InvalidInput("username must be 3 to 32 characters"));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> Result<(), Rejection> {
    if !email.contains('@') {
        return Err(Rejection::InvalidInput("email address is not valid"));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<(), Rejection> {
    if password.len() < 8 {
        return Err(Rejection::InvalidInput("password must be at least 8 characters"));
    }
    Ok(())
}

/// Issue a code and hand it to the mailer. A delivery failure is logged; the
/// user can ask for another code.
fn send_code(state: &AppState, email: &str) {
    let code = state.codes.issue(email);
    if let Err(e) = state.mailer.send_verification_code(email, &code) {
        warn!("Failed to send verification code to {}: {:#}", email, e);
    }
}
