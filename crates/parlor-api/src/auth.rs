use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use parlor_core::{ChatRegistry, CoreError, EventSink, MessageStore, ReadTracker};
use parlor_db::Database;
use parlor_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
};

use crate::error::ApiError;
use crate::run_blocking;

pub type AppState = Arc<AppStateInner>;

/// Shared application state: the database, the core services composed over
/// it, and the event sink they publish through.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub registry: ChatRegistry,
    pub messages: MessageStore,
    pub reads: ReadTracker,
    pub events: Arc<dyn EventSink>,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if req.name.is_empty() || req.name.len() > 100 {
        return Err(CoreError::validation("Name must be 1-100 characters.").into());
    }
    if !req.email.contains('@') || req.email.len() > 255 {
        return Err(CoreError::validation("Invalid email address.").into());
    }
    if req.password.len() < 8 {
        return Err(CoreError::validation("Password must be at least 8 characters.").into());
    }

    // Fast path: skip the hashing work when the email is plainly taken.
    // The unique column makes the final call at insert time.
    let db = state.db.clone();
    let email = req.email.clone();
    let existing = run_blocking(move || Ok(db.get_user_by_email(&email)?)).await?;
    if existing.is_some() {
        return Err(ApiError::EmailTaken);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hash failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();

    let db = state.db.clone();
    let (name, email) = (req.name.clone(), req.email.clone());
    let created = run_blocking(move || {
        let now = chrono::Utc::now().to_rfc3339();
        Ok(db.create_user(&user_id.to_string(), &name, &email, &password_hash, &now)?)
    })
    .await?;
    if !created {
        // A racing registration for the same email got there first
        return Err(ApiError::EmailTaken);
    }

    let token = create_token(&state.jwt_secret, user_id, &req.name)
        .map_err(ApiError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let email = req.email.clone();
    let user = run_blocking(move || Ok(db.get_user_by_email(&email)?))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored hash unparseable: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("bad stored user id: {}", e))?;

    let token = create_token(&state.jwt_secret, user_id, &user.name).map_err(ApiError::from)?;

    Ok(Json(LoginResponse {
        user_id,
        name: user.name,
        token,
    }))
}

fn create_token(secret: &str, user_id: Uuid, name: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
