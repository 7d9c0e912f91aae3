// Authentication boundary (spec §6): a callback invoked on CONNECT and on
// AUTH packets. `Decision` mirrors the three outcomes the spec names;
// the broker core never needs to know which backend produced one.

pub mod file_auth;
pub mod passwd;

pub use file_auth::FileAuthBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    AcceptWithChallenge(Vec<u8>),
    Deny,
}

pub struct AuthRequest<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
    pub auth_method: Option<&'a str>,
    pub auth_data: Option<&'a [u8]>,
}

/// Pluggable authentication backend. `authenticate` must not block the
/// selector thread for longer than is acceptable for the whole broker —
/// a file-backed check like [`FileAuthBackend`] is fine; anything that
/// hits the network should marshal its result back to this thread rather
/// than call out synchronously (spec §5).
pub trait AuthBackend {
    fn authenticate(&self, request: &AuthRequest<'_>) -> Decision;
}

/// Accepts every connection; the default when no password file or ACL is
/// configured and `allow_anonymous` is set.
pub struct AllowAllBackend;

impl AuthBackend for AllowAllBackend {
    fn authenticate(&self, _request: &AuthRequest<'_>) -> Decision {
        Decision::Accept
    }
}

/// Rejects every connection; used when no password file is configured and
/// `allow_anonymous` is false, so the broker doesn't silently accept
/// anyone.
pub struct DenyAllBackend;

impl AuthBackend for DenyAllBackend {
    fn authenticate(&self, _request: &AuthRequest<'_>) -> Decision {
        Decision::Deny
    }
}

/// Consults an optional ACL backend before a publish or subscribe is
/// admitted. Absent a configured backend, every operation is allowed
/// (spec's non-goal list does not mention ACL; included as an optional
/// boundary matching the authentication boundary's own shape).
pub trait AclBackend {
    fn check(&self, client_id: &str, topic: &str, is_publish: bool) -> bool;
}

pub struct AllowAllAcl;

impl AclBackend for AllowAllAcl {
    fn check(&self, _client_id: &str, _topic: &str, _is_publish: bool) -> bool {
        true
    }
}
