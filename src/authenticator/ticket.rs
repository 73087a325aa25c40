use std::sync::Arc;

use tracing::info;

use super::{Authenticator, ManageAction, Status, TicketVerifier, TICKET_PARAM};
use crate::context::AuthenticationContext;
use crate::error::AuthResult;
use crate::manager::AuthenticationManager;

/// Stateless bearer ticket passed as a request parameter. An invalid ticket is a hard failure.
pub struct TicketAuthenticator {
    verifier: Arc<dyn TicketVerifier>,
    param: String,
}

impl TicketAuthenticator {
    pub fn new(verifier: Arc<dyn TicketVerifier>) -> Self {
        Self { verifier, param: TICKET_PARAM.to_string() }
    }

    pub fn with_param(mut self, name: &str) -> Self {
        self.param = name.to_string();
        self
    }
}

impl Authenticator for TicketAuthenticator {
    fn try_authenticate(&self, manager: &AuthenticationManager, ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        let Some(ticket) = ctx.parameter(&self.param) else {
            return Ok(Status::None);
        };
        match self.verifier.verify(&ticket) {
            Some(p) => {
                manager.register(ctx, p)?;
                Ok(Status::Success)
            }
            None => {
                info!(target: "authflow::ticket", "ticket rejected");
                Ok(Status::Failure)
            }
        }
    }

    fn authenticate(&self, _manager: &AuthenticationManager, _ctx: &mut AuthenticationContext<'_>) -> AuthResult<Status> {
        Ok(Status::None)
    }

    fn manage(&self, _manager: &AuthenticationManager, _ctx: &mut AuthenticationContext<'_>) -> AuthResult<ManageAction> {
        Ok(ManageAction::None)
    }
}
