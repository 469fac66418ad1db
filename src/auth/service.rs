use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;

use crate::db::{User, UserStore};
use crate::error::{AppError, AuthError, DatabaseError};

const SALT_LEN: usize = 16;
const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 12;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // Username
    pub exp: i64,     // Expiration time
    pub iat: i64,     // Issued at
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    jwt_secret: String,
    token_expiry: Duration,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, jwt_secret: String, token_expiry_minutes: i64) -> Self {
        Self {
            users,
            jwt_secret,
            token_expiry: Duration::minutes(token_expiry_minutes),
        }
    }

    /// Creates the account and returns a bearer token for it. The very
    /// first account becomes the admin.
    pub async fn signup(&self, username: &str, password: &str) -> Result<String, AppError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::ValidationError("username must not be empty".into()));
        }
        let len = password.chars().count();
        if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
            return Err(AppError::ValidationError(format!(
                "password must be between {} and {} characters",
                MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
            )));
        }

        if self.users.find_user_by_username(username).await?.is_some() {
            return Err(already_registered());
        }

        let user = self
            .users
            .create_user(username, &hash_password(password))
            .await
            .map_err(|e| match e {
                DatabaseError::Duplicate(_) => already_registered(),
                other => other.into(),
            })?;

        info!("Registered user {} (admin: {})", user.username, user.is_admin);
        self.generate_token(&user.username)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String, AppError> {
        let user = self
            .users
            .find_user_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials.into());
        }

        self.generate_token(&user.username)
    }

    pub async fn validate_token(&self, token: &str) -> Result<User, AppError> {
        let claims = self.decode_token(token)?;

        let user = self
            .users
            .find_user_by_username(&claims.sub)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        Ok(user)
    }

    fn generate_token(&self, username: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            exp: (now + self.token_expiry).timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        Ok(token)
    }

    fn decode_token(&self, token: &str) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;

        Ok(claims.claims)
    }
}

fn already_registered() -> AppError {
    AppError::DatabaseError(DatabaseError::Duplicate("Username already registered".into()))
}

fn salted_digest(salt: &[u8], password: &str) -> Vec<u8> {
    Sha256::new()
        .chain_update(salt)
        .chain_update(password.as_bytes())
        .finalize()
        .to_vec()
}

/// `base64(salt)$base64(sha256(salt || password))`
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = salted_digest(&salt, password);
    format!("{}${}", BASE64.encode(salt), BASE64.encode(digest))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (BASE64.decode(salt), BASE64.decode(expected)) else {
        return false;
    };

    let actual = salted_digest(&salt, password);
    actual.len() == expected.len()
        && actual.iter().zip(&expected).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}
