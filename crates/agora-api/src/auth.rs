use std::sync::Arc;

use agora_core::Hub;
use agora_types::api::Claims;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::blobs::BlobStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub hub: Arc<Hub>,
    pub blobs: Arc<dyn BlobStore>,
    pub jwt_secret: String,
    pub max_upload_bytes: usize,
}

/// Mint an HS256 token the way the identity provider does. Used for local
/// development and tests.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    username: &str,
    is_admin: bool,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let expires = chrono::Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| anyhow::anyhow!("token lifetime {ttl} is out of range"))?;
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        is_admin,
        exp: expires.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
