//! Legacy ambient cache: cookie-style text values with a max-age
//!
//! The jar owns expiry. Values are JSON text stored under an
//! application-chosen name; nothing here shares keys or timestamps with the
//! durable [`Cache`](super::Cache).

use futures::Future;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct Cookie {
    value: String,
    expires_at: i64,
}

/// A cookie jar with store-managed expiry
#[derive(Debug)]
pub struct AmbientJar {
    cookies: Mutex<HashMap<String, Cookie>>,
    clock: Arc<dyn Clock>,
}

impl Default for AmbientJar {
    fn default() -> Self {
        Self::new()
    }
}

impl AmbientJar {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            cookies: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Returns the raw text of a live cookie
    pub fn get(&self, name: &str) -> Option<String> {
        let now = self.clock.now_millis();
        let mut cookies = self.cookies();
        match cookies.get(name) {
            Some(cookie) if cookie.expires_at > now => Some(cookie.value.clone()),
            Some(_) => {
                cookies.remove(name);
                None
            }
            None => None,
        }
    }

    /// Sets a cookie; a `max_age_secs` of zero or less removes it instead
    pub fn set(&self, name: &str, value: impl Into<String>, max_age_secs: i64) {
        let mut cookies = self.cookies();
        if max_age_secs <= 0 {
            cookies.remove(name);
            return;
        }
        let expires_at = self
            .clock
            .now_millis()
            .saturating_add(max_age_secs.saturating_mul(1000));
        cookies.insert(
            name.to_string(),
            Cookie {
                value: value.into(),
                expires_at,
            },
        );
    }

    /// Expires a cookie immediately
    pub fn expire(&self, name: &str) {
        self.set(name, "", 0);
    }

    /// Live cookies as a `name=value; name2=value2` header, sorted by name
    pub fn cookie_header(&self) -> String {
        let now = self.clock.now_millis();
        let mut cookies = self.cookies();
        cookies.retain(|_, cookie| cookie.expires_at > now);

        let mut pairs: Vec<_> = cookies
            .iter()
            .map(|(name, cookie)| format!("{}={}", name, cookie.value))
            .collect();
        pairs.sort();
        pairs.join("; ")
    }

    fn cookies(&self) -> MutexGuard<'_, HashMap<String, Cookie>> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Finds `name` in a `name=value; ...` header; the value runs to the next `; `
pub fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split("; ")
        .filter_map(|pair| pair.split_once('='))
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, value)| value)
}

/// Read-through cache over an [`AmbientJar`]
#[derive(Debug, Clone, Default)]
pub struct AmbientCache {
    jar: Arc<AmbientJar>,
}

impl AmbientCache {
    pub fn new(jar: Arc<AmbientJar>) -> Self {
        Self { jar }
    }

    pub fn jar(&self) -> &AmbientJar {
        &self.jar
    }

    /// Returns the value stored under `name`
    ///
    /// A value that no longer parses is expired on the spot and reported as
    /// absent.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let text = self.jar.get(name)?;
        match serde_json::from_str(&text) {
            Ok(value) => {
                debug!(name, "Ambient cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(name, error = %e, "Failed to parse ambient cache value, expiring it");
                self.jar.expire(name);
                None
            }
        }
    }

    /// Returns the stored value, or runs `producer` and stores its result for `max_age_secs`
    ///
    /// Producer errors are returned unchanged and nothing is stored.
    pub async fn read_through<T, E, F>(&self, name: &str, producer: F, max_age_secs: i64) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.read(name) {
            return Ok(value);
        }

        let value = producer.await?;
        match serde_json::to_string(&value) {
            Ok(text) => self.jar.set(name, text, max_age_secs),
            Err(e) => warn!(name, error = %e, "Failed to encode ambient cache value"),
        }
        Ok(value)
    }

    /// [`read_through`](Self::read_through) with the max-age as a `Duration`
    pub async fn read_through_for<T, E, F>(&self, name: &str, producer: F, max_age: Duration) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T, E>>,
    {
        let secs = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        self.read_through(name, producer, secs).await
    }
}
