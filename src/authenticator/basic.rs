use std::sync::Arc;

use base64::Engine;
use tracing::debug;

use super::{Authenticator, CredentialVerifier, ManageAction, Status};
use crate::context::AuthenticationContext;
use crate::error::AuthResult;
use crate::manager::AuthenticationManager;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    /// Decode an `Authorization: Basic ...` header value. The user id ends at the first `:`.
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, rest) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let raw = base64::engine::general_purpose::STANDARD.decode(rest.trim()).ok()?;
        let text = String::from_utf8(raw).ok()?;
        let (username, password) = text.split_once(':')?;
        Some(Self { username: username.to_string(), password: password.to_string() })
    }

    pub fn to_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(raw))
    }
}

/// HTTP basic challenge/response. The header is re-verified on every request, so dropping it,
/// switching user or presenting a stale password ends the login.
pub struct BasicAuthenticator {
    verifier: Arc<dyn CredentialVerifier>,
    realm: String,
}

impl BasicAuthenticator {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, realm: &str) -> Self {
        Self { verifier, realm: realm.to_string() }
    }

    fn credentials(ctx: &AuthenticationContext<'_>) -> Option<BasicCredentials> {
        BasicCredentials::parse(&ctx.header("authorization")?)
    }
}

impl Authenticator for BasicAuthenticator {
    fn try_authenticate(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        let Some(creds) = Self::credentials(ctx) else {
            return Ok(Status::None);
        };
        if !self.verifier.check_credentials(&creds.username, &creds.password) {
            debug!(target: "authflow::basic", username = %creds.username, "basic credentials rejected");
            return Ok(Status::None);
        }
        match self.verifier.load_principal(&creds.username) {
            Some(p) => {
                manager.register(ctx, p)?;
                Ok(Status::Success)
            }
            None => Ok(Status::None),
        }
    }

    fn authenticate(&self, _manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        let challenge = format!("Basic realm=\"{}\"", self.realm);
        let ex = ctx.exchange_mut();
        ex.set_header("WWW-Authenticate", &challenge);
        ex.set_status(401);
        Ok(Status::Continue)
    }

    fn manage(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<ManageAction> {
        let current = manager.current_principal(ctx);
        let presented = Self::credentials(ctx);
        let valid = match (current, presented) {
            (Some(p), Some(c)) => p.name() == c.username && self.verifier.check_credentials(&c.username, &c.password),
            _ => false,
        };
        if !valid {
            debug!(target: "authflow::basic", "stored login no longer matches the presented credentials");
        }
        Ok(if valid { ManageAction::None } else { ManageAction::Clear })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_at_first_colon() {
        let h = BasicCredentials { username: "bob".into(), password: "a:b".into() }.to_header();
        let c = BasicCredentials::parse(&h).unwrap();
        assert_eq!(c.username, "bob");
        assert_eq!(c.password, "a:b");
        assert_eq!(BasicCredentials::parse("basic Ym9iOng=").unwrap().password, "x");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(BasicCredentials::parse("Bearer abc"), None);
        assert_eq!(BasicCredentials::parse("Basic !!!"), None);
        // "nocolon"
        assert_eq!(BasicCredentials::parse("Basic bm9jb2xvbg=="), None);
        assert_eq!(BasicCredentials::parse("Basic"), None);
    }
}
