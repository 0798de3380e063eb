use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::info;

use crate::data::AuthService;
use crate::model::User;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("sign in to do that")]
    NotAuthenticated,
}

/// Who is looking at the feed. Passed explicitly to every operation that
/// needs to know.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    user: Option<User>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|user| user.id)
    }

    pub fn require(&self) -> Result<i64, SessionError> {
        self.user_id().ok_or(SessionError::NotAuthenticated)
    }
}

pub struct Manager {
    service: Arc<dyn AuthService>,
    current: RwLock<Session>,
}

impl Manager {
    pub fn new(service: Arc<dyn AuthService>) -> Self {
        Self {
            service,
            current: RwLock::new(Session::anonymous()),
        }
    }

    pub fn current(&self) -> Session {
        self.current.read().clone()
    }

    /// Asks the backend who the cookie belongs to.
    pub fn refresh(&self) -> Result<Session> {
        let session = match self
            .service
            .current_user()
            .context("session: resolve current user")?
        {
            Some(user) => {
                info!(user_id = user.id, "signed in as {}", user.label());
                Session::authenticated(user)
            }
            None => Session::anonymous(),
        };
        *self.current.write() = session.clone();
        Ok(session)
    }

    pub fn logout(&self) -> Result<()> {
        self.service.logout().context("session: logout")?;
        *self.current.write() = Session::anonymous();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MockBackend;

    #[test]
    fn anonymous_sessions_are_rejected() {
        let session = Session::anonymous();
        assert!(!session.is_authenticated());
        assert_eq!(session.require(), Err(SessionError::NotAuthenticated));
    }

    #[test]
    fn refresh_and_logout_follow_the_backend() {
        let backend = Arc::new(MockBackend::sample());
        let manager = Manager::new(backend.clone());
        assert!(!manager.current().is_authenticated());

        let session = manager.refresh().unwrap();
        assert_eq!(session.user_id(), Some(MockBackend::VIEWER_ID));
        assert_eq!(manager.current(), session);

        manager.logout().unwrap();
        assert!(!manager.current().is_authenticated());
        assert!(!manager.refresh().unwrap().is_authenticated());
    }
}
