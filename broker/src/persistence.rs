// Session persistence boundary (spec §6: "persistence of sessions to
// durable storage, supplied as a key-value interface the core may call on
// session snapshot/restore"). No backend ships in this crate; the boundary
// exists so a caller can plug one in without the broker core depending on
// any particular storage engine.

use crate::types::ClientId;

/// Durable session snapshot store. The broker core never constructs one of
/// these itself — a caller wires a concrete implementation in at startup,
/// mirroring how an `AuthBackend` is supplied.
pub trait SessionStore {
    fn session_snapshot_save(&self, client_id: &ClientId, bytes: &[u8]);
    fn session_snapshot_load(&self, client_id: &ClientId) -> Option<Vec<u8>>;
}

/// Default store: saves nothing, loads nothing. Sessions still survive a
/// reconnect within process lifetime via `BrokerCore`'s in-memory session
/// table; only cross-restart durability is absent.
pub struct NullSessionStore;

impl SessionStore for NullSessionStore {
    fn session_snapshot_save(&self, _client_id: &ClientId, _bytes: &[u8]) {}

    fn session_snapshot_load(&self, _client_id: &ClientId) -> Option<Vec<u8>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_store_never_returns_a_snapshot() {
        let store = NullSessionStore;
        let id = ClientId::new("a".to_string());
        store.session_snapshot_save(&id, b"ignored");
        assert!(store.session_snapshot_load(&id).is_none());
    }
}
