//! Shared application state.
//!
//! Built once at startup from [`AppConfig`] and shared read-only behind an
//! `Arc` by every request. Nothing in here is mutated after construction;
//! each request opens its own database connection.

use std::sync::Arc;

use rusqlite::Connection;
use thiserror::Error;

use crate::config::AppConfig;
use crate::crypto::{CryptoError, PasswordHasher, TokenSigner};
use crate::db::{self, DatabaseError};
use crate::models::enums::Role;
use crate::models::{NewUser, PatientProfile, User};
use crate::storage::{build_report_store, ReportStore};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Crypto setup failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

pub struct CoreState {
    pub config: AppConfig,
    hasher: PasswordHasher,
    tokens: TokenSigner,
    reports: Arc<dyn ReportStore>,
}

impl CoreState {
    pub fn new(config: AppConfig) -> Result<Self, CoreError> {
        let tokens = TokenSigner::new(
            config.jwt_secret.as_bytes(),
            chrono::Duration::hours(config.token_ttl_hours),
        )?;
        Ok(Self {
            hasher: PasswordHasher::new(config.password_iterations),
            reports: build_report_store(&config.report_store),
            tokens,
            config,
        })
    }

    /// Swap the report store, e.g. for an in-memory one.
    pub fn with_report_store(mut self, reports: Arc<dyn ReportStore>) -> Self {
        self.reports = reports;
        self
    }

    /// Open a connection for the current request.
    pub fn open_db(&self) -> Result<Connection, DatabaseError> {
        db::connect(&self.config.database_path)
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub fn tokens(&self) -> &TokenSigner {
        &self.tokens
    }

    pub fn reports(&self) -> &dyn ReportStore {
        self.reports.as_ref()
    }

    /// Create the configured first Admin unless that email already exists.
    pub fn bootstrap_admin(&self) -> Result<Option<User>, CoreError> {
        let Some(admin) = &self.config.bootstrap_admin else {
            return Ok(None);
        };

        let mut conn = self.open_db()?;
        if db::find_credentials_by_email(&conn, &admin.email)?.is_some() {
            tracing::debug!(email = %admin.email, "Bootstrap admin already present");
            return Ok(None);
        }

        let new = NewUser {
            name: admin.name.clone(),
            email: admin.email.clone(),
            password: admin.password.clone(),
            role: Role::Admin,
            specialization: None,
        };
        let hash = self.hasher.hash(&new.password);
        let user = db::create_user(&mut conn, &new, &hash, &PatientProfile::default())?;
        tracing::info!(user_id = %user.id, email = %user.email, "Bootstrap admin created");
        Ok(Some(user))
    }
}
