//! Workspace to conversation-session mapping
//!
//! A workspace always maps to the same session id, across restarts, without
//! storing anything: the id is a name-based UUID (v5) of the workspace path.
//! What this process has already started lives in a [`SessionRegistry`]; the
//! assistant's own session store covers everything else, reconciled by the
//! client's conflict-recovery path.

use crate::util::lock_unpoisoned;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Namespace for session ids so they never collide with other v5 users of the same paths.
const SESSION_NAMESPACE: Uuid = Uuid::from_u128(0x6d61_7267_696e_4a11_a5e5_5e55_1011_d000);

/// One logical workspace. Stable for the lifetime of a dispatcher/client pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identity string hashed into the session id.
    pub fn identity(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    pub fn session_id(&self) -> SessionId {
        SessionId::for_identity(&self.identity())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn for_identity(identity: &str) -> Self {
        Self(Uuid::new_v5(&SESSION_NAMESPACE, identity.as_bytes()))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Sessions started (or found already started) by one client instance.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    known: Mutex<HashSet<SessionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        lock_unpoisoned(&self.known).contains(&id)
    }

    /// Returns true if the id was not known before.
    pub fn mark_known(&self, id: SessionId) -> bool {
        lock_unpoisoned(&self.known).insert(id)
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.known).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
