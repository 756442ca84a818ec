use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dashmcp_core::{SessionError, SessionId};
use tokio::time::Instant;

use super::SessionEntry;

/// Registry of live sessions, keyed by session id.
///
/// None of the operations close anything; callers that remove an entry own
/// closing it.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Return the entry for `id`, building it with `create` if absent.
    ///
    /// The shard lock for `id` is held from lookup to insert, so concurrent
    /// callers for the same id run `create` at most once between them. If
    /// `create` fails nothing is inserted. `create` must not touch the
    /// registry.
    pub fn get_or_create<F>(
        &self,
        id: &SessionId,
        create: F,
    ) -> Result<(Arc<SessionEntry>, bool), SessionError>
    where
        F: FnOnce() -> Result<SessionEntry, SessionError>,
    {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(occupied) => Ok((Arc::clone(occupied.get()), false)),
            Entry::Vacant(vacant) => {
                let entry = Arc::new(create()?);
                vacant.insert(Arc::clone(&entry));
                Ok((entry, true))
            }
        }
    }

    /// [`get_or_create`](Self::get_or_create), stamping activity at `now`
    /// before the shard lock is released. An idle check that runs under the
    /// same lock therefore sees either the stale entry before this call or the
    /// touched one after it, never a returned entry that is still stale.
    pub fn get_or_create_touched<F>(
        &self,
        id: &SessionId,
        now: Instant,
        create: F,
    ) -> Result<(Arc<SessionEntry>, bool), SessionError>
    where
        F: FnOnce() -> Result<SessionEntry, SessionError>,
    {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(occupied) => {
                let entry = Arc::clone(occupied.get());
                entry.touch(now);
                Ok((entry, false))
            }
            Entry::Vacant(vacant) => {
                let entry = Arc::new(create()?);
                entry.touch(now);
                vacant.insert(Arc::clone(&entry));
                Ok((entry, true))
            }
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Remove `id`, returning the entry if it was present.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions.remove(id).map(|(_, entry)| entry)
    }

    /// Remove `entry` only if it is still the one registered under its id.
    pub fn remove_if_same(&self, entry: &Arc<SessionEntry>) -> bool {
        self.sessions
            .remove_if(entry.id(), |_, current| Arc::ptr_eq(current, entry))
            .is_some()
    }

    /// Remove `entry` if it is still the registered one and has been idle for
    /// longer than `max_idle` at `now`. The idle check runs under the shard
    /// lock.
    pub fn remove_if_idle(
        &self,
        entry: &Arc<SessionEntry>,
        now: Instant,
        max_idle: Duration,
    ) -> bool {
        self.sessions
            .remove_if(entry.id(), |_, current| {
                Arc::ptr_eq(current, entry) && current.idle_for(now) > max_idle
            })
            .is_some()
    }

    /// Point-in-time copy of all entries.
    pub fn snapshot(&self) -> Vec<Arc<SessionEntry>> {
        self.sessions.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Visit a snapshot, so `f` may freely mutate the registry.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<SessionEntry>),
    {
        for entry in self.snapshot() {
            f(&entry);
        }
    }

    /// Remove every entry and return them.
    pub fn drain(&self) -> Vec<Arc<SessionEntry>> {
        let mut drained = Vec::with_capacity(self.sessions.len());
        self.sessions.retain(|_, entry| {
            drained.push(Arc::clone(entry));
            false
        });
        drained
    }

    pub fn size(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
