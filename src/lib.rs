pub mod error;
pub mod config;
pub mod principal;
pub mod attributes;
pub mod session;
pub mod exchange;
pub mod bridge;
pub mod context;
pub mod saved_request;
pub mod store;
pub mod manager;
pub mod authenticator;
pub mod registry;
pub mod authorizer;
pub mod orchestrator;
pub mod directory;
pub mod adapter;

pub use authenticator::{Authenticator, ManageAction, Status};
pub use context::AuthenticationContext;
pub use error::{AuthError, AuthResult, RegistryError, StatusHint};
pub use manager::AuthenticationManager;
pub use orchestrator::{Orchestrator, Outcome};
pub use principal::Principal;
pub use registry::{AppScope, Container, Registry};
