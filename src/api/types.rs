//! Shared types for the API layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::core_state::CoreState;
use crate::models::enums::{Role, RoleSet};
use crate::models::User;

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        let limiter = RateLimiter::new(
            Duration::from_secs(core.config.rate_limit_window_secs),
            core.config.rate_limit_max,
        );
        Self {
            core,
            rate_limiter: Arc::new(Mutex::new(limiter)),
        }
    }
}

/// Authenticated caller, injected into request extensions by the auth
/// middleware. Handlers take it by value; it is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl Identity {
    /// Fail with `Forbidden` unless the caller's role is in `allowed`.
    pub fn require(&self, allowed: RoleSet) -> Result<(), ApiError> {
        if allowed.contains(self.role) {
            Ok(())
        } else {
            tracing::debug!(user_id = %self.id, role = %self.role, "Role not permitted");
            Err(ApiError::Forbidden)
        }
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }
    }
}

/// Fixed-window rate limiter keyed by client.
pub struct RateLimiter {
    windows: HashMap<String, (Instant, u32)>,
    window: Duration,
    max: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            windows: HashMap::new(),
            window,
            max,
        }
    }

    /// Count one request for `key`. Returns `Err(retry_after_secs)` once the
    /// window's budget is spent.
    pub fn check(&mut self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&mut self, key: &str, now: Instant) -> Result<(), u64> {
        let window = self.window;
        if self.windows.len() > 10_000 {
            self.windows
                .retain(|_, (start, _)| now.duration_since(*start) < window);
        }

        let (start, count) = self.windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(*start) >= window {
            *start = now;
            *count = 0;
        }
        if *count >= self.max {
            let remaining = window.saturating_sub(now.duration_since(*start));
            return Err(remaining.as_secs().max(1));
        }
        *count += 1;
        Ok(())
    }
}
