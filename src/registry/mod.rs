//! Strategy catalog, application scopes and per-scope resolution.

pub mod catalog;
mod resolve;
mod scope;

pub use catalog::{ambient, AuthenticatorFactory, StrategyCatalog};
pub use resolve::Registry;
pub use scope::{normalize_context_path, AppScope, Container};

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
