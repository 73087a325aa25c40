//! Authentication strategies and their lifecycle contract.
//!
//! A strategy is driven through `begin`, then `manage` (only when a principal is already
//! stored), `try_authenticate`, `authenticate` (only for mandatory resources), and finally
//! exactly one of `finish` or `abort`. Strategies that establish identity must call
//! [`AuthenticationManager::register`] before returning [`Status::Success`].

mod basic;
mod certificate;
mod composite;
mod delegating;
mod form;
mod logout;
mod ticket;

pub use basic::{BasicAuthenticator, BasicCredentials};
pub use certificate::CertificateAuthenticator;
pub use composite::CompositeAuthenticator;
pub use delegating::DelegatingAuthenticator;
pub use form::FormAuthenticator;
pub use logout::{LogoutAuthenticator, LogoutHook};
pub use ticket::TicketAuthenticator;

use crate::context::AuthenticationContext;
use crate::error::{AuthError, AuthResult};
use crate::exchange::Certificate;
use crate::manager::AuthenticationManager;
use crate::principal::Principal;

pub const LOGIN_ACTION: &str = "/j_security_check";
pub const USERNAME_PARAM: &str = "j_username";
pub const PASSWORD_PARAM: &str = "j_password";
pub const TICKET_PARAM: &str = "j_security_ticket";
pub const LOGOUT_ACTION: &str = "/j_security_exit";
pub const LOGOUT_TARGET_PARAM: &str = "_to";
pub const LOGOUT_FORWARD_PREFIX: &str = "_p_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Identity established and registered.
    Success,
    /// The strategy already produced the response (redirect, challenge, login page).
    Continue,
    /// Hard rejection.
    Failure,
    /// Nothing to say; let the next phase or strategy decide.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageAction {
    None,
    /// Drop the stored principal.
    Clear,
}

pub trait Authenticator: Send + Sync {
    fn begin(&self, _manager: &AuthenticationManager, _ctx: &mut AuthenticationContext<'_>) -> AuthResult<()> {
        Ok(())
    }

    fn finish(&self, _manager: &AuthenticationManager, _ctx: &mut AuthenticationContext<'_>) -> AuthResult<()> {
        Ok(())
    }

    /// Cleanup after a failed pass. Must not fail.
    fn abort(&self, _manager: &AuthenticationManager, _ctx: &mut AuthenticationContext<'_>, _error: &AuthError) {}

    fn try_authenticate(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status>;

    fn authenticate(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status>;

    fn manage(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<ManageAction>;
}

/// Username/password verification for the form and basic strategies.
pub trait CredentialVerifier: Send + Sync {
    fn check_credentials(&self, username: &str, password: &str) -> bool;

    fn load_principal(&self, username: &str) -> Option<Principal>;

    /// Extra query appended to the saved request after a form login.
    fn login_query(&self, _principal: &Principal) -> Option<String> { None }
}

pub trait TicketVerifier: Send + Sync {
    /// `None` when the ticket is not valid.
    fn verify(&self, ticket: &str) -> Option<Principal>;
}

pub trait CertificateVerifier: Send + Sync {
    /// `None` when the chain is not acceptable.
    fn verify(&self, chain: &[Certificate]) -> Option<Principal>;
}
