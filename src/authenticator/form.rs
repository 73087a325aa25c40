use std::sync::Arc;

use tracing::{debug, info};

use super::{Authenticator, CredentialVerifier, ManageAction, Status, LOGIN_ACTION, PASSWORD_PARAM, USERNAME_PARAM};
use crate::context::AuthenticationContext;
use crate::error::AuthResult;
use crate::manager::AuthenticationManager;
use crate::principal::Principal;

/// Key of the principal waiting for the replayed request.
pub const PENDING_KEY: &str = "authflow.form.pending";

/// Credential form login with a redirect back to the saved request.
///
/// A login posts to `.../j_security_check`. On success the principal is parked as "pending"
/// in the authentication map and the caller is redirected to the saved request; the
/// replayed request then registers it.
pub struct FormAuthenticator {
    verifier: Arc<dyn CredentialVerifier>,
    login_page: String,
    error_page: String,
}

impl FormAuthenticator {
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { verifier, login_page: "/login".into(), error_page: "/login-error".into() }
    }

    pub fn with_login_page(mut self, path: &str) -> Self {
        self.login_page = path.to_string();
        self
    }

    pub fn with_error_page(mut self, path: &str) -> Self {
        self.error_page = path.to_string();
        self
    }

    pub fn login_page(&self) -> &str { &self.login_page }
    pub fn error_page(&self) -> &str { &self.error_page }

    fn take_pending(&self, ctx: &mut AuthenticationContext<'_>) -> Option<Principal> {
        let map = ctx.authentication(false)?;
        let p = map.get_as::<Principal>(PENDING_KEY);
        map.remove(PENDING_KEY);
        p
    }

    fn has_pending(&self, ctx: &mut AuthenticationContext<'_>) -> bool {
        ctx.authentication(false).is_some_and(|m| m.contains_key(PENDING_KEY))
    }

    fn login(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>, password: &str) -> AuthResult<Status> {
        let username = ctx.parameter(USERNAME_PARAM).unwrap_or_default();
        let principal = if self.verifier.check_credentials(&username, password) {
            self.verifier.load_principal(&username)
        } else {
            None
        };
        let Some(principal) = principal else {
            info!(target: "authflow::form", username = %username, "login rejected");
            manager.forward(ctx, &self.error_page)?;
            return Ok(Status::Continue);
        };

        if !manager.has_request(ctx) {
            manager.save_request_path(ctx, "/")?;
        }
        if let Some(map) = ctx.authentication(true) {
            map.put(PENDING_KEY, &principal)?;
        }
        if let Some(extra) = self.verifier.login_query(&principal) {
            manager.add_query_string(ctx, &extra);
        }
        debug!(target: "authflow::form", username = %username, "credentials accepted, replaying saved request");
        manager.redirect_to_request(ctx)?;
        Ok(Status::Continue)
    }
}

impl Authenticator for FormAuthenticator {
    fn try_authenticate(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        if self.has_pending(ctx) && manager.matches_request(ctx) {
            if let Some(principal) = self.take_pending(ctx) {
                manager.register(ctx, principal)?;
                manager.clear_request(ctx);
                return Ok(Status::Success);
            }
        }
        if ctx.request_path().ends_with(LOGIN_ACTION) {
            if let Some(password) = ctx.parameter(PASSWORD_PARAM) {
                return self.login(manager, ctx, &password);
            }
        }
        Ok(Status::None)
    }

    fn authenticate(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        manager.save_request(ctx)?;
        manager.forward(ctx, &self.login_page)?;
        Ok(Status::Continue)
    }

    fn manage(&self, _manager: &AuthenticationManager, _ctx: &mut AuthenticationContext<'_>) -> AuthResult<ManageAction> {
        Ok(ManageAction::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BridgeSettings, ScopeConfig};
    use crate::exchange::MemoryExchange;
    use crate::registry::Container;
    use crate::session::{SessionRegistry, SESSION_COOKIE};
    use crate::store::{PrincipalStoreFactory, SessionStoreFactory};

    struct OneUser;

    impl CredentialVerifier for OneUser {
        fn check_credentials(&self, username: &str, password: &str) -> bool {
            username == "alice" && password == "secret"
        }
        fn load_principal(&self, username: &str) -> Option<Principal> {
            Some(Principal::with_groups(username, &["user"]))
        }
        fn login_query(&self, _principal: &Principal) -> Option<String> { Some("welcome=1".into()) }
    }

    fn run(
        container: &Arc<Container>,
        sid: &mut Option<String>,
        ex: MemoryExchange,
        f: impl FnOnce(&FormAuthenticator, &AuthenticationManager, &mut AuthenticationContext<'_>) -> Status,
    ) -> (Status, MemoryExchange) {
        let mut ex = match sid { Some(s) => ex.with_cookie(SESSION_COOKIE, s), None => ex };
        let form = FormAuthenticator::new(Arc::new(OneUser));
        let scope = container.scope("/app").unwrap();
        let status = {
            let mut ctx = AuthenticationContext::new(&mut ex, scope, true).unwrap();
            let store = SessionStoreFactory.create(&mut ctx).unwrap();
            let m = AuthenticationManager::new(store);
            f(&form, &m, &mut ctx)
        };
        if let Some(s) = ex.session_id() { *sid = Some(s.to_string()); }
        (status, ex)
    }

    #[test]
    fn bad_password_goes_to_error_page() {
        let container = Container::new(BridgeSettings::default());
        container.add_scope("/app", ScopeConfig::default());
        let sessions = SessionRegistry::default();
        let mut sid = None;
        let ex = MemoryExchange::new("/app/j_security_check", sessions.clone())
            .with_param(USERNAME_PARAM, "alice")
            .with_param(PASSWORD_PARAM, "wrong");
        let (status, ex) = run(&container, &mut sid, ex, |a, m, c| a.try_authenticate(m, c).unwrap());
        assert_eq!(status, Status::Continue);
        assert_eq!(ex.location(), Some("/app/login-error"));
    }

    #[test]
    fn login_without_saved_request_lands_on_root_with_extra_query() {
        let container = Container::new(BridgeSettings::default());
        container.add_scope("/app", ScopeConfig::default());
        let sessions = SessionRegistry::default();
        let mut sid = None;
        let ex = MemoryExchange::new("/app/j_security_check", sessions.clone())
            .with_form_body("j_username=alice&j_password=secret");
        let (status, ex) = run(&container, &mut sid, ex, |a, m, c| a.try_authenticate(m, c).unwrap());
        assert_eq!(status, Status::Continue);
        assert_eq!(ex.location(), Some("/app/?welcome=1"));

        let ex = MemoryExchange::new("/app/?welcome=1", sessions.clone());
        let (status, _) = run(&container, &mut sid, ex, |a, m, c| {
            let s = a.try_authenticate(m, c).unwrap();
            assert_eq!(m.registered().unwrap().name(), "alice");
            assert!(!m.has_request(c));
            s
        });
        assert_eq!(status, Status::Success);
    }

    #[test]
    fn pending_principal_waits_for_matching_request() {
        let container = Container::new(BridgeSettings::default());
        container.add_scope("/app", ScopeConfig::default());
        let sessions = SessionRegistry::default();
        let mut sid = None;
        let ex = MemoryExchange::new("/app/secret", sessions.clone());
        let (status, _) = run(&container, &mut sid, ex, |a, m, c| a.authenticate(m, c).unwrap());
        assert_eq!(status, Status::Continue);
        let ex = MemoryExchange::new("/app/j_security_check", sessions.clone())
            .with_form_body("j_username=alice&j_password=secret");
        run(&container, &mut sid, ex, |a, m, c| a.try_authenticate(m, c).unwrap());

        let ex = MemoryExchange::new("/app/unrelated", sessions.clone());
        let (status, _) = run(&container, &mut sid, ex, |a, m, c| a.try_authenticate(m, c).unwrap());
        assert_eq!(status, Status::None);
        let ex = MemoryExchange::new("/app/secret", sessions.clone());
        let (status, _) = run(&container, &mut sid, ex, |a, m, c| a.try_authenticate(m, c).unwrap());
        assert_eq!(status, Status::Success);
    }
}
