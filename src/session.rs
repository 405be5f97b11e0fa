//! Session lifecycle: start-up token validation, login, registration, logout.
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::backend::AuthApi;
use crate::error::{ApiError, Error, FieldError, Result};
use crate::model::{AuthSession, LoginCredentials, Registration};
use crate::store::{self, Pool};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

const MIN_PASSWORD_LEN: usize = 6;

fn check_email(email: &str, errors: &mut Vec<FieldError>) {
    if email.trim().is_empty() {
        errors.push(FieldError::new("email", "email is required"));
    } else if !EMAIL_RE.is_match(email.trim()) {
        errors.push(FieldError::new("email", "invalid email address"));
    }
}

pub fn validate_login(credentials: &LoginCredentials) -> Result<()> {
    let mut errors = Vec::new();
    check_email(&credentials.email, &mut errors);
    if credentials.password.trim().is_empty() {
        errors.push(FieldError::new("password", "password is required"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::ValidationFailed(errors))
    }
}

/// Check every registration field and report all failures at once.
pub fn validate_registration(registration: &Registration) -> Result<()> {
    let mut errors = Vec::new();
    if registration.firstname.trim().is_empty() {
        errors.push(FieldError::new("firstname", "first name is required"));
    }
    if registration.lastname.trim().is_empty() {
        errors.push(FieldError::new("lastname", "last name is required"));
    }
    check_email(&registration.email, &mut errors);
    if registration.password.trim().is_empty() {
        errors.push(FieldError::new("password", "password is required"));
    } else if registration.password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new("password", "password must be at least 6 characters"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::ValidationFailed(errors))
    }
}

/// Owns the durable token and the auth backend. Produces `AuthSession`
/// values that callers pass into the controllers.
#[derive(Clone)]
pub struct SessionManager {
    auth: Arc<dyn AuthApi>,
    pool: Pool,
}

impl SessionManager {
    pub fn new(auth: Arc<dyn AuthApi>, pool: Pool) -> Self {
        Self { auth, pool }
    }

    /// Restore the session from storage. A token the backend rejects is
    /// dropped silently: that is the ordinary signed-out path.
    #[instrument(skip_all)]
    pub async fn init(&self) -> Result<AuthSession> {
        let Some(token) = store::load_token(&self.pool).await? else {
            return Ok(AuthSession::anonymous());
        };
        match self.auth.check_token(&token).await {
            Ok(user) => {
                debug!(user_id = %user.id, "stored token accepted");
                Ok(AuthSession::signed_in(user, token))
            }
            Err(err) => {
                debug!(%err, "stored token rejected; clearing session");
                store::clear_token(&self.pool).await?;
                Ok(AuthSession::anonymous())
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthSession> {
        validate_login(credentials)?;
        let resp = self.auth.login(credentials).await.map_err(|err| {
            match err.status() {
                Some(400 | 401 | 403 | 404) => Error::AuthenticationFailed,
                _ => Error::Transport(err),
            }
        })?;
        store::save_token(&self.pool, &resp.token).await?;
        info!(user_id = %resp.user.id, "signed in");
        Ok(AuthSession::signed_in(resp.user, resp.token))
    }

    #[instrument(skip_all)]
    pub async fn register(&self, registration: &Registration) -> Result<AuthSession> {
        validate_registration(registration)?;
        let resp = self
            .auth
            .register(registration)
            .await
            .map_err(registration_error)?;
        store::save_token(&self.pool, &resp.token).await?;
        info!(user_id = %resp.user.id, "account created");
        Ok(AuthSession::signed_in(resp.user, resp.token))
    }

    /// Forget the stored token and empty `session`. Later controller calls
    /// made with it fail fast with `Unauthenticated`.
    #[instrument(skip_all)]
    pub async fn logout(&self, session: &mut AuthSession) -> Result<()> {
        session.clear();
        store::clear_token(&self.pool).await?;
        info!("signed out");
        Ok(())
    }
}

fn registration_error(err: ApiError) -> Error {
    match err.status() {
        Some(400 | 409) => {
            let message = err
                .message()
                .unwrap_or("an account with this email already exists")
                .to_string();
            warn!(%message, "registration rejected");
            Error::RegistrationConflict(message)
        }
        _ => Error::Transport(err),
    }
}
