use std::sync::Arc;

use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};

use crate::catalog::Directory;

/// Shared-secret password auth. Only logins known to the directory may
/// connect; the login name becomes the acting identity.
#[derive(Debug)]
pub struct RoombookAuthSource {
    password: String,
    directory: Arc<dyn Directory>,
}

impl RoombookAuthSource {
    pub fn new(password: String, directory: Arc<dyn Directory>) -> Self {
        Self { password, directory }
    }
}

#[async_trait]
impl AuthSource for RoombookAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let user = login.user().unwrap_or_default();
        if self.directory.actor(user).is_none() {
            metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
            tracing::debug!("rejecting unknown login {user:?}");
            return Err(PgWireError::UserError(Box::new(ErrorInfo::new(
                "FATAL".into(),
                "28000".into(),
                format!("unknown user: {user}"),
            ))));
        }
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
