//! Login, logout and admin password rotation against the remote API.
//!
//! The session is modelled as an explicit [`SessionState`] value that every
//! operation takes and returns, so the credential currently in use and the
//! knowledge that the factory password is stale never hide inside the client.

use std::cell::Cell;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::ZabbixApi;
use crate::api::models::Id;
use crate::error::{ProvisionError, ProvisionResult};
use crate::retry::retry_until;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Authenticating,
    Authenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    FactoryDefault,
    Configured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub active_credential: Option<Credential>,
    /// Cleared once the configured password has been seen to work, or after
    /// the password was rotated. Relogins then skip the factory attempt.
    pub default_credential_valid: bool,
    pub user_id: Option<Id>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            active_credential: None,
            default_credential_valid: true,
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordChange {
    Changed,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub default_password: String,
    pub configured_password: String,
}

impl Credentials {
    fn password(&self, credential: Credential) -> &str {
        match credential {
            Credential::FactoryDefault => &self.default_password,
            Credential::Configured => &self.configured_password,
        }
    }
}

pub struct SessionManager<'a> {
    api: &'a dyn ZabbixApi,
    credentials: Credentials,
    wait: Duration,
    max_attempts: u32,
}

impl<'a> SessionManager<'a> {
    pub fn new(
        api: &'a dyn ZabbixApi,
        credentials: Credentials,
        wait: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            api,
            credentials,
            wait,
            max_attempts,
        }
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    async fn try_login(&self, credential: Credential) -> bool {
        match self
            .api
            .login(&self.credentials.username, self.credentials.password(credential))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                debug!(?credential, error = %e, "Login attempt failed.");
                false
            }
        }
    }

    /// One login cycle: factory credential first (unless known stale), then
    /// the configured one.
    async fn login_cycle(&self, default_valid: &Cell<bool>) -> Option<Credential> {
        if default_valid.get() && self.try_login(Credential::FactoryDefault).await {
            return Some(Credential::FactoryDefault);
        }
        let same_password = self.credentials.configured_password == self.credentials.default_password;
        if default_valid.get() && same_password {
            return None;
        }
        if self.try_login(Credential::Configured).await {
            if !same_password {
                default_valid.set(false);
            }
            return Some(Credential::Configured);
        }
        None
    }

    pub async fn login(&self, state: SessionState) -> ProvisionResult<SessionState> {
        let state = SessionState {
            phase: SessionPhase::Authenticating,
            ..state
        };
        debug!(user = %self.credentials.username, phase = ?state.phase, "Logging into the server.");
        let default_valid = Cell::new(state.default_credential_valid);
        let active = Cell::new(None);

        let authenticated = {
            let default_valid = &default_valid;
            let active = &active;
            let max_attempts = self.max_attempts;
            let wait = self.wait;
            retry_until("login", wait, max_attempts, move |attempt| async move {
                if attempt > 1 {
                    info!(
                        attempt,
                        max_attempts,
                        interval_secs = wait.as_secs(),
                        "Login attempt."
                    );
                }
                match self.login_cycle(default_valid).await {
                    Some(credential) => {
                        active.set(Some(credential));
                        true
                    }
                    None => false,
                }
            })
            .await
        };

        if !authenticated {
            warn!(attempts = self.max_attempts, "Login attempts exhausted.");
            return Err(ProvisionError::AuthExhausted {
                attempts: self.max_attempts,
            });
        }

        let user_id = self
            .api
            .user_get(&self.credentials.username)
            .await?
            .into_iter()
            .next()
            .map(|u| u.userid)
            .ok_or_else(|| ProvisionError::missing("user", self.credentials.username.clone()))?;

        Ok(SessionState {
            phase: SessionPhase::Authenticated,
            active_credential: active.get(),
            default_credential_valid: default_valid.get(),
            user_id: Some(user_id),
        })
    }

    /// Always ends `Disconnected`; a failing logout call is only logged.
    pub async fn logout(&self, state: SessionState) -> SessionState {
        debug!("Logout from the server.");
        if let Err(e) = self.api.logout().await {
            warn!(error = %e, "Logout failed.");
        }
        SessionState {
            phase: SessionPhase::Disconnected,
            active_credential: None,
            user_id: None,
            ..state
        }
    }

    pub async fn relogin(&self, state: SessionState) -> ProvisionResult<SessionState> {
        let state = self.logout(state).await;
        self.login(state).await
    }

    /// Rotates the admin password to the configured one when the password in
    /// use differs. The live session is not swapped; callers relogin after a
    /// change.
    pub async fn change_password(
        &self,
        state: SessionState,
    ) -> ProvisionResult<(SessionState, PasswordChange)> {
        let current = match state.active_credential {
            Some(credential) => self.credentials.password(credential),
            None => {
                return Err(ProvisionError::Config(
                    "password change requires an authenticated session".to_string(),
                ));
            }
        };
        if current == self.credentials.configured_password {
            info!("Skip updating the admin password.");
            return Ok((state, PasswordChange::Unchanged));
        }

        let user_id = state
            .user_id
            .clone()
            .ok_or_else(|| ProvisionError::missing("user", self.credentials.username.clone()))?;
        info!("Changing the default admin password.");
        self.api
            .user_update_password(&user_id, &self.credentials.configured_password)
            .await?;
        Ok((
            SessionState {
                default_credential_valid: false,
                ..state
            },
            PasswordChange::Changed,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ADMIN_ID, FakeZabbix};

    fn manager<'a>(api: &'a FakeZabbix, configured: &str, attempts: u32) -> SessionManager<'a> {
        SessionManager::new(
            api,
            Credentials {
                username: "admin".into(),
                default_password: "zabbix".into(),
                configured_password: configured.into(),
            },
            Duration::from_secs(5),
            attempts,
        )
    }

    #[tokio::test]
    async fn test_login_with_factory_default() {
        let api = FakeZabbix::new();
        let sessions = manager(&api, "s3cret", 3);

        let state = sessions.login(SessionState::default()).await.unwrap();
        assert_eq!(state.phase, SessionPhase::Authenticated);
        assert_eq!(state.active_credential, Some(Credential::FactoryDefault));
        assert!(state.default_credential_valid);
        assert_eq!(state.user_id.as_deref(), Some(ADMIN_ID));
    }

    #[tokio::test]
    async fn test_fallback_to_configured_then_skip_stale_default() {
        let api = FakeZabbix::new();
        api.set_password("admin", "s3cret");
        let sessions = manager(&api, "s3cret", 3);

        let state = sessions.login(SessionState::default()).await.unwrap();
        assert_eq!(state.active_credential, Some(Credential::Configured));
        assert!(!state.default_credential_valid);

        let (state, change) = sessions.change_password(state).await.unwrap();
        assert_eq!(change, PasswordChange::Unchanged);
        assert!(api.calls().is_empty());

        api.state().login_attempts.clear();
        let state = sessions.relogin(state).await.unwrap();
        assert_eq!(state.phase, SessionPhase::Authenticated);
        assert_eq!(
            api.state().login_attempts,
            vec![("admin".to_string(), "s3cret".to_string())]
        );
    }

    #[tokio::test]
    async fn test_password_change_then_relogin_uses_new_password() {
        let api = FakeZabbix::new();
        let sessions = manager(&api, "s3cret", 3);

        let state = sessions.login(SessionState::default()).await.unwrap();
        let (state, change) = sessions.change_password(state).await.unwrap();
        assert_eq!(change, PasswordChange::Changed);
        assert_eq!(api.calls(), vec!["user.update"]);

        api.state().login_attempts.clear();
        let state = sessions.relogin(state).await.unwrap();
        assert_eq!(state.active_credential, Some(Credential::Configured));
        assert_eq!(
            api.state().login_attempts,
            vec![("admin".to_string(), "s3cret".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unchanged_when_configured_password_is_the_default() {
        let api = FakeZabbix::new();
        let sessions = manager(&api, "zabbix", 3);

        let state = sessions.login(SessionState::default()).await.unwrap();
        let (_, change) = sessions.change_password(state).await.unwrap();
        assert_eq!(change, PasswordChange::Unchanged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_exhausted_after_max_cycles() {
        let api = FakeZabbix::new();
        api.set_password("admin", "something-else");
        let sessions = manager(&api, "s3cret", 3);

        let err = sessions.login(SessionState::default()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::AuthExhausted { attempts: 3 }));
        // Two credentials per cycle.
        assert_eq!(api.state().login_attempts.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_count_as_failed_attempts() {
        let api = FakeZabbix::new();
        api.state().frontend_down = true;
        let sessions = manager(&api, "s3cret", 2);

        let err = sessions.login(SessionState::default()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::AuthExhausted { .. }));
        assert_eq!(api.state().login_attempts.len(), 4);
    }

    #[tokio::test]
    async fn test_logout_returns_to_disconnected() {
        let api = FakeZabbix::new();
        let sessions = manager(&api, "s3cret", 1);

        let state = sessions.login(SessionState::default()).await.unwrap();
        let state = sessions.logout(state).await;
        assert_eq!(state.phase, SessionPhase::Disconnected);
        assert!(state.user_id.is_none());
        assert!(api.state().logged_in.is_none());
    }
}
