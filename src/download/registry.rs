//! Active-download registry.
//!
//! The id → token map and the set of reserved destinations share one mutex, so
//! picking a unique file name, registering a download and retiring it are each
//! atomic with respect to the others. The lock is never held across `.await`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use super::filename::unique_file_name;

/// Registry entry of one running download.
#[derive(Debug)]
struct ActiveDownload {
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct RegistryState {
    active: HashMap<i64, ActiveDownload>,
    /// Destinations claimed by downloads whose task has not retired yet.
    reserved: HashSet<PathBuf>,
    shut_down: bool,
}

/// Shared between the coordinator and every task.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Picks a free name for `candidate` in `dir` and reserves its path.
    ///
    /// Returns `None` once the registry is shut down.
    pub(crate) fn reserve_destination(&self, dir: &Path, candidate: &str) -> Option<PathBuf> {
        let mut state = self.lock();
        if state.shut_down {
            return None;
        }
        let name = unique_file_name(dir, candidate, &state.reserved);
        let path = dir.join(name);
        state.reserved.insert(path.clone());
        Some(path)
    }

    /// Gives back a reservation that never became a running download.
    pub(crate) fn release_destination(&self, path: &Path) {
        self.lock().reserved.remove(path);
    }

    /// Registers `id` as active. Returns false once the registry is shut down.
    pub(crate) fn register(&self, id: i64, token: CancellationToken) -> bool {
        let mut state = self.lock();
        if state.shut_down {
            return false;
        }
        state.active.insert(id, ActiveDownload { token });
        true
    }

    /// Cancels `id` and drops it from the active map. Its destination stays
    /// reserved until the task retires.
    pub(crate) fn cancel(&self, id: i64) -> bool {
        let mut state = self.lock();
        match state.active.remove(&id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every active download and returns how many there were.
    pub(crate) fn cancel_all(&self) -> usize {
        cancel_every(&mut self.lock())
    }

    /// Cancels everything and refuses further registrations.
    pub(crate) fn shut_down(&self) -> usize {
        let mut state = self.lock();
        state.shut_down = true;
        cancel_every(&mut state)
    }

    /// Removes a finished task and reports whether it ended cancelled.
    ///
    /// The terminal decision is taken here, under the lock: a token cancelled
    /// before this point always wins over a clean end of stream.
    pub(crate) fn retire(&self, id: i64, token: &CancellationToken, destination: &Path) -> bool {
        let mut state = self.lock();
        let cancelled = token.is_cancelled();
        state.active.remove(&id);
        state.reserved.remove(destination);
        cancelled
    }

    pub(crate) fn is_active(&self, id: i64) -> bool {
        self.lock().active.contains_key(&id)
    }

    pub(crate) fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Active ids in ascending order.
    pub(crate) fn active_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.lock().active.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }
}

fn cancel_every(state: &mut RegistryState) -> usize {
    let count = state.active.len();
    for (_, entry) in state.active.drain() {
        entry.token.cancel();
    }
    count
}
