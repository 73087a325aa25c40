use std::sync::Arc;

use super::{Authenticator, CertificateVerifier, ManageAction, Status};
use crate::context::AuthenticationContext;
use crate::error::AuthResult;
use crate::manager::AuthenticationManager;

/// TLS client-certificate login.
pub struct CertificateAuthenticator {
    verifier: Arc<dyn CertificateVerifier>,
}

impl CertificateAuthenticator {
    pub fn new(verifier: Arc<dyn CertificateVerifier>) -> Self { Self { verifier } }
}

impl Authenticator for CertificateAuthenticator {
    fn try_authenticate(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        let chain = match ctx.client_certificates() {
            Some(c) if !c.is_empty() => c,
            _ => return Ok(Status::None),
        };
        match self.verifier.verify(&chain) {
            Some(p) => {
                manager.register(ctx, p)?;
                Ok(Status::Success)
            }
            None => Ok(Status::Failure),
        }
    }

    fn authenticate(&self, _manager: &AuthenticationManager, _ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        Ok(Status::None)
    }

    fn manage(&self, _manager: &AuthenticationManager, _ctx: &mut AuthenticationContext<'_>) -> AuthResult<ManageAction> {
        Ok(ManageAction::None)
    }
}

#[cfg(test)]
#[path = "certificate_tests.rs"]
mod tests;
