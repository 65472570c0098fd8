//! Routing table from `(session, actor)` to live [`PeerActor`]s.
//!
//! Sessions register on creation and are removed when their
//! [`SessionRegistration`] guard drops, taking their actors with them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::peer::PeerActor;

type SessionActors = HashMap<String, Arc<PeerActor>>;

#[derive(Debug, Default)]
pub struct ActorDirectory {
    sessions: RwLock<HashMap<String, SessionActors>>,
}

impl ActorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session_id`. Its actors live until the returned guard drops.
    pub fn register_session(self: &Arc<Self>, session_id: impl Into<String>) -> SessionRegistration {
        let session_id = session_id.into();
        self.sessions
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .entry(session_id.clone())
            .or_default();
        debug!("directory: registered session {session_id}");
        SessionRegistration {
            directory: Arc::clone(self),
            session_id,
        }
    }

    /// Look up an actor. Unknown sessions and unknown actors both yield `None`.
    pub fn get(&self, session_id: &str, actor_id: &str) -> Option<Arc<PeerActor>> {
        self.sessions
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(session_id)?
            .get(actor_id)
            .cloned()
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn insert(&self, session_id: &str, actor_id: String, actor: Arc<PeerActor>) -> bool {
        match self
            .sessions
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .get_mut(session_id)
        {
            Some(actors) => {
                actors.insert(actor_id, actor);
                true
            }
            None => false,
        }
    }

    fn remove_session(&self, session_id: &str) {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(session_id);
        if let Some(actors) = removed {
            debug!(
                "directory: dropped session {session_id} with {} actors",
                actors.len()
            );
        }
    }
}

/// Keeps a session's actors reachable. Dropping it unregisters them.
#[derive(Debug)]
pub struct SessionRegistration {
    directory: Arc<ActorDirectory>,
    session_id: String,
}

impl SessionRegistration {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Make `actor` routable under this session. Returns `false` only if the
    /// session has already been removed.
    pub fn add_actor(&self, actor_id: impl Into<String>, actor: Arc<PeerActor>) -> bool {
        self.directory.insert(&self.session_id, actor_id.into(), actor)
    }
}

impl Drop for SessionRegistration {
    fn drop(&mut self) {
        self.directory.remove_session(&self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    use apconform::SigningKeypair;

    fn actor(uri: &str) -> Arc<PeerActor> {
        static KEY: OnceLock<Arc<SigningKeypair>> = OnceLock::new();
        let key = KEY
            .get_or_init(|| Arc::new(SigningKeypair::generate(1024).unwrap()))
            .clone();
        Arc::new(PeerActor::new(uri, 1, key, reqwest::Client::new()))
    }

    #[test]
    fn actors_are_scoped_by_session() {
        let dir = Arc::new(ActorDirectory::new());
        let a = dir.register_session("s1");
        let b = dir.register_session("s2");
        assert!(a.add_actor("x", actor("http://h/ap/u/s1/x")));

        assert!(dir.get("s1", "x").is_some());
        assert!(dir.get("s2", "x").is_none());
        assert!(dir.get("nope", "x").is_none());
        assert_eq!(b.session_id(), "s2");
        assert_eq!(dir.session_count(), 2);
    }

    #[test]
    fn dropping_registration_unregisters_actors() {
        let dir = Arc::new(ActorDirectory::new());
        {
            let reg = dir.register_session("s1");
            reg.add_actor("x", actor("http://h/ap/u/s1/x"));
            assert!(dir.has_session("s1"));
        }
        assert!(!dir.has_session("s1"));
        assert!(dir.get("s1", "x").is_none());
    }
}
