//! Cached user profile
//!
//! The profile record is written by whatever login/signup producer ran last,
//! so its shape is not guaranteed: some producers store the API response as
//! is (`{"data": {...}}`), others store the profile itself. Decoding is
//! lenient about optional fields and strict about identity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::cache::Cache;
use crate::keys::USER_PROFILE;

/// A trading account's profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    /// Paper-money balance
    pub balance: f64,
    pub profile_img: Option<String>,
    pub created_at: Option<String>,
}

/// Reads the cached profile, if there is a usable one
pub async fn user_from_cache(cache: &Cache) -> Option<User> {
    let cached: Value = cache.get(USER_PROFILE).await?;
    let user = user_from_value(&cached);
    if user.is_none() {
        warn!("Cached user profile is missing or malformed");
    }
    user
}

/// Builds a [`User`] from a profile object or an object wrapping it under `data`
pub fn user_from_value(value: &Value) -> Option<User> {
    let object = value.as_object()?;
    let profile = match object.get("data") {
        Some(Value::Object(inner)) => inner,
        _ => object,
    };

    let id = match profile.get("id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let email = profile.get("email")?.as_str()?.to_string();

    Some(User {
        id,
        username: string_field(profile.get("username")).unwrap_or_default(),
        email,
        balance: profile.get("balance").and_then(Value::as_f64).unwrap_or(0.0),
        profile_img: string_field(profile.get("profile_img")),
        created_at: string_field(profile.get("created_at")),
    })
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}
