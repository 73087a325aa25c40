use tracing::info;

use super::{Authenticator, ManageAction, Status, LOGOUT_ACTION, LOGOUT_FORWARD_PREFIX, LOGOUT_TARGET_PARAM};
use crate::context::AuthenticationContext;
use crate::error::AuthResult;
use crate::manager::AuthenticationManager;

pub type LogoutHook = Box<dyn Fn(&AuthenticationManager, &mut AuthenticationContext<'_>) + Send + Sync>;

/// Ends the login when the caller hits `.../j_security_exit`.
///
/// The next location comes from `_to` (default `/`). Parameters named `_p_<name>` are passed
/// on to it as `<name>=<value>`.
pub struct LogoutAuthenticator {
    on_logout: Option<LogoutHook>,
    default_target: String,
}

impl Default for LogoutAuthenticator {
    fn default() -> Self { Self::new() }
}

impl LogoutAuthenticator {
    pub fn new() -> Self { Self { on_logout: None, default_target: "/".into() } }

    pub fn with_hook(mut self, hook: LogoutHook) -> Self {
        self.on_logout = Some(hook);
        self
    }

    pub fn with_default_target(mut self, path: &str) -> Self {
        self.default_target = path.to_string();
        self
    }

    /// Next location for this request.
    pub fn next_path(&self, ctx: &AuthenticationContext<'_>) -> String {
        let base = ctx
            .parameter(LOGOUT_TARGET_PARAM)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.default_target.clone());
        let forwarded: Vec<String> = ctx
            .parameters()
            .into_iter()
            .filter_map(|(k, v)| {
                let name = k.strip_prefix(LOGOUT_FORWARD_PREFIX)?;
                Some(format!("{}={}", urlencoding::encode(name), urlencoding::encode(&v)))
            })
            .collect();
        if forwarded.is_empty() {
            return base;
        }
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{}{}{}", base, sep, forwarded.join("&"))
    }
}

impl Authenticator for LogoutAuthenticator {
    fn try_authenticate(&self, _manager: &AuthenticationManager, _ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        Ok(Status::None)
    }

    fn authenticate(&self, _manager: &AuthenticationManager, _ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        Ok(Status::None)
    }

    fn manage(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<ManageAction> {
        if !ctx.request_path().ends_with(LOGOUT_ACTION) {
            return Ok(ManageAction::None);
        }
        if let Some(hook) = &self.on_logout {
            hook(manager, ctx);
        }
        let next = self.next_path(ctx);
        info!(target: "authflow::logout", next = %next, "logout");
        manager.forward(ctx, &next)?;
        Ok(ManageAction::Clear)
    }
}
