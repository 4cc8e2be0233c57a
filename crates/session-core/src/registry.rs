//! Room-level session registry.
//!
//! At most one live session may exist per room. The registry hands out
//! the claim atomically; teardown releases it exactly once, after which
//! the room can be claimed again.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use televisit_signaling_core::RoomId;

use crate::errors::{Result, SessionError};
use crate::types::SessionId;

/// Tracks which session currently owns each room
pub struct SessionRegistry {
    active: DashMap<RoomId, SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
        }
    }

    /// Claim the room for a session. Fails if another live session
    /// already holds it.
    pub fn claim(&self, room: &RoomId, session: &SessionId) -> Result<()> {
        match self.active.entry(room.clone()) {
            Entry::Occupied(_) => Err(SessionError::DuplicateSession(room.clone())),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                debug!("session {} claimed room {}", session, room);
                Ok(())
            }
        }
    }

    /// Release the room if this session holds it. Releasing a room held
    /// by a different session is a no-op.
    pub fn release(&self, room: &RoomId, session: &SessionId) {
        let removed = self
            .active
            .remove_if(room, |_, holder| holder == session)
            .is_some();
        if removed {
            debug!("session {} released room {}", session, room);
        }
    }

    /// The session currently holding the room, if any
    pub fn active_session(&self, room: &RoomId) -> Option<SessionId> {
        self.active.get(room).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
