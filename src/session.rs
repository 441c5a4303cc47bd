/// file: src/session.rs
/// description: Session store holding the authenticated identity and its lifecycle
use crate::api::ApiClient;
use crate::error::ApiError;
use crate::types::{Identity, NewAccount, Role};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Silent re-authentication is in flight; render nothing yet.
    Loading,
    Anonymous,
    Authenticated(Identity),
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Outcome of checking a screen's access requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Wait,
    RedirectToLogin,
    RedirectToDashboard,
    Allow,
}

pub struct SessionStore {
    api: Arc<ApiClient>,
    state: watch::Sender<SessionState>,
}

impl SessionStore {
    /// Starts in [`SessionState::Loading`] until [`SessionStore::restore`] runs.
    pub fn new(api: Arc<ApiClient>) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        Self { api, state }
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().identity().is_some()
    }

    pub fn is_loading(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Loading)
    }

    fn set(&self, next: SessionState) {
        self.state.send_replace(next);
    }

    /// Silent re-authentication from the persisted credential.
    pub async fn restore(&self) -> Option<Identity> {
        self.set(SessionState::Loading);

        if self.api.access_token().is_none() {
            debug!("No stored credential, starting anonymous");
            self.set(SessionState::Anonymous);
            return None;
        }

        match self.api.profile().await {
            Ok(Some(identity)) => {
                info!("Restored session for {}", identity.email);
                self.set(SessionState::Authenticated(identity.clone()));
                Some(identity)
            }
            Ok(None) => {
                debug!("Profile response carried no user");
                self.set(SessionState::Anonymous);
                None
            }
            Err(e) => {
                debug!("Session restore failed: {}", e);
                self.set(SessionState::Anonymous);
                None
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, ApiError> {
        self.api.login(email, password).await?;

        let identity = self.api.profile().await?.ok_or_else(|| ApiError::Auth {
            message: "Login succeeded but no profile was returned".to_string(),
        })?;

        info!("Logged in as {} ({})", identity.email, identity.role);
        self.set(SessionState::Authenticated(identity.clone()));
        Ok(identity)
    }

    pub async fn register(&self, account: &NewAccount) -> Result<(), ApiError> {
        self.api.register(account).await?;
        info!("Registered account {}", account.email);
        Ok(())
    }

    /// Invalidates the server-side credential, then clears local state no matter what.
    pub async fn logout(&self) {
        if let Err(e) = self.api.logout().await {
            warn!("Server logout failed, clearing local session anyway: {}", e);
        }
        self.invalidate();
        info!("Logged out");
    }

    /// Drops the local session without telling the server, e.g. after a 401.
    pub fn invalidate(&self) {
        self.api.credentials().clear();
        self.set(SessionState::Anonymous);
    }

    /// Access check for a screen; `allowed` of `None` admits every role.
    pub fn guard(&self, allowed: Option<&[Role]>) -> RouteDecision {
        match &*self.state.borrow() {
            SessionState::Loading => RouteDecision::Wait,
            SessionState::Anonymous => RouteDecision::RedirectToLogin,
            SessionState::Authenticated(identity) => match allowed {
                Some(roles) if !roles.contains(&identity.role) => {
                    RouteDecision::RedirectToDashboard
                }
                _ => RouteDecision::Allow,
            },
        }
    }
}
