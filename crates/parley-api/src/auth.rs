use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use parley_db::{Database, now_millis, users};
use parley_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, run_blocking};

const TOKEN_LIFETIME_DAYS: i64 = 30;

/// Create an account with a password credential. Returns the new user id.
pub fn register_user(db: &Database, req: &RegisterRequest) -> ApiResult<Uuid> {
    let name = req.name.trim();
    let email = req.email.trim();

    if name.is_empty() || name.chars().count() > 80 {
        return Err(ApiError::BadRequest("Name must be 1-80 characters".into()));
    }
    if !email.contains('@') {
        return Err(ApiError::BadRequest("Invalid email".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("Password must be at least 8 characters".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();

    db.with_tx(|tx| {
        if users::get_by_email(tx, email)?.is_some() {
            return Err(ApiError::Conflict("Email already registered".into()));
        }
        users::insert(tx, &user_id.to_string(), name, email, &password_hash, now_millis())?;
        Ok(())
    })?;

    info!("Registered user {} ({})", name, user_id);
    Ok(user_id)
}

/// Check a password credential. Returns (user_id, name).
pub fn verify_login(db: &Database, req: &LoginRequest) -> ApiResult<(Uuid, String)> {
    let user = db
        .with_conn(|conn| users::get_by_email(conn, req.email.trim()))?
        .ok_or(ApiError::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored password hash unreadable: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;

    Ok((user_id, user.name))
}

pub fn create_token(secret: &str, user_id: Uuid, name: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
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

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim().to_string();
    let user_id = run_blocking(&state, move |db| register_user(db, &req)).await?;
    let token = create_token(&state.jwt_secret, user_id, &name)?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let (user_id, name) = run_blocking(&state, move |db| verify_login(db, &req)).await?;
    let token = create_token(&state.jwt_secret, user_id, &name)?;

    Ok(Json(LoginResponse {
        user_id,
        name,
        token,
    }))
}
