use super::*;
use crate::config::{BridgeSettings, ScopeConfig};
use crate::exchange::{Certificate, MemoryExchange};
use crate::principal::Principal;
use crate::registry::Container;
use crate::session::SessionRegistry;
use crate::store::MemoryPrincipalStore;

/// Accepts a leaf whose subject is `CN=<user>` for a known user.
struct SubjectTable;

impl CertificateVerifier for SubjectTable {
    fn verify(&self, chain: &[Certificate]) -> Option<Principal> {
        let subject = chain.first()?.subject.as_deref()?;
        match subject {
            "CN=alice" => Some(Principal::with_groups("alice", &["ops"])),
            _ => None,
        }
    }
}

fn attempt(certs: Option<Vec<Certificate>>) -> (Status, Option<Principal>) {
    let container = Container::new(BridgeSettings::default());
    let scope = container.add_scope("/app", ScopeConfig::default());
    let mut ex = MemoryExchange::new("/app/secure", SessionRegistry::default());
    if let Some(c) = certs {
        ex = ex.with_certificates(c);
    }
    let m = AuthenticationManager::new(Arc::new(MemoryPrincipalStore::new()));
    let mut ctx = AuthenticationContext::new(&mut ex, scope, true).unwrap();
    let status = CertificateAuthenticator::new(Arc::new(SubjectTable)).try_authenticate(&m, &mut ctx).unwrap();
    (status, m.registered())
}

fn cert(subject: &str) -> Certificate { Certificate::new(vec![0x30, 0x82], Some(subject.to_string())) }

#[test]
fn no_chain_has_nothing_to_say() {
    assert_eq!(attempt(None), (Status::None, None));
    assert_eq!(attempt(Some(Vec::new())), (Status::None, None));
}

#[test]
fn known_subject_registers_principal() {
    let (status, principal) = attempt(Some(vec![cert("CN=alice"), cert("CN=Issuing CA")]));
    assert_eq!(status, Status::Success);
    let p = principal.unwrap();
    assert_eq!(p.name(), "alice");
    assert!(p.has_group("ops"));
}

#[test]
fn unknown_subject_is_a_hard_failure() {
    assert_eq!(attempt(Some(vec![cert("CN=mallory")])), (Status::Failure, None));
}
