//! Registry of live client sessions and output delivery to them

use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::connection::ClientSession;
use crate::core::filter::FilterChain;
use crate::error::Result;

// Tracks live client sessions and delivers output to them
pub struct SessionManager {
    sessions: Mutex<Vec<Arc<ClientSession>>>,
    filters: FilterChain,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_filters(FilterChain::new())
    }

    pub fn with_filters(filters: FilterChain) -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            filters,
        }
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    // Append a newly accepted session
    pub fn register(&self, session: Arc<ClientSession>) -> Result<()> {
        let mut sessions = self.lock()?;
        if sessions.iter().all(|existing| existing.id != session.id) {
            sessions.push(session);
        }
        Ok(())
    }

    /// Send `message` to every live session, or only to `target`.
    ///
    /// Dead sessions are pruned first. The outbound filters run once per
    /// message; a drop there means no session receives it. Returns the
    /// number of sessions the message was queued for.
    pub fn output(&self, message: &str, target: Option<&Arc<ClientSession>>) -> Result<usize> {
        let sessions = {
            let mut guard = self.lock()?;
            prune(&mut guard);
            match target {
                None => guard.clone(),
                Some(_) => Vec::new(),
            }
        };

        let message = match self.filters.output(message.to_string()) {
            Some(message) => message,
            None => return Ok(0),
        };

        let delivered = match target {
            None => sessions
                .iter()
                .filter(|session| session.try_deliver(&message))
                .count(),
            // The target may have disconnected concurrently
            Some(session) => usize::from(session.is_alive() && session.try_deliver(&message)),
        };
        Ok(delivered)
    }

    // Send a message to all connected clients
    pub fn broadcast(&self, message: &str) -> Result<usize> {
        self.output(message, None)
    }

    // Send a message to one client
    pub fn unicast(&self, message: &str, target: &Arc<ClientSession>) -> Result<usize> {
        self.output(message, Some(target))
    }

    // Number of live clients, after pruning
    pub fn client_count(&self) -> Result<usize> {
        let mut sessions = self.lock()?;
        prune(&mut sessions);
        Ok(sessions.len())
    }

    pub fn client_ids(&self) -> Result<Vec<u64>> {
        Ok(self.lock()?.iter().map(|session| session.id).collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Arc<ClientSession>>>> {
        Ok(self.sessions.lock()?)
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn prune(sessions: &mut Vec<Arc<ClientSession>>) {
    sessions.retain(|session| {
        if session.is_alive() {
            true
        } else {
            log::debug!("Pruning dead {}", session);
            false
        }
    });
}

// Thread-safe session manager wrapper
pub type Sessions = Arc<SessionManager>;

// Create a new thread-safe session manager
pub fn create_session_manager(filters: FilterChain) -> Sessions {
    Arc::new(SessionManager::with_filters(filters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::SessionChannels;
    use crate::core::filter::{Filter, FilterAction};

    fn session() -> (Arc<ClientSession>, SessionChannels) {
        ClientSession::new(8, None)
    }

    fn drain(channels: &mut SessionChannels) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = channels.outbound.try_recv() {
            lines.push(line);
        }
        lines
    }

    struct DropOutput;

    impl Filter for DropOutput {
        fn name(&self) -> &str {
            "drop-output"
        }

        fn output(&self, _message: String) -> FilterAction {
            FilterAction::Drop
        }
    }

    #[test]
    fn test_broadcast_reaches_only_live_sessions() {
        let manager = SessionManager::new();
        let (a, mut a_rx) = session();
        let (b, mut b_rx) = session();
        let (c, mut c_rx) = session();
        for s in [&a, &b, &c] {
            manager.register(s.clone()).unwrap();
        }

        b.close();
        assert_eq!(manager.broadcast("hello").unwrap(), 2);

        assert_eq!(drain(&mut a_rx), vec!["hello"]);
        assert!(drain(&mut b_rx).is_empty());
        assert_eq!(drain(&mut c_rx), vec!["hello"]);
        assert_eq!(manager.client_ids().unwrap(), vec![a.id, c.id]);
    }

    #[test]
    fn test_unicast_reaches_only_target() {
        let manager = SessionManager::new();
        let (a, mut a_rx) = session();
        let (b, mut b_rx) = session();
        manager.register(a.clone()).unwrap();
        manager.register(b.clone()).unwrap();

        assert_eq!(manager.unicast("just you", &b).unwrap(), 1);
        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(drain(&mut b_rx), vec!["just you"]);
    }

    #[test]
    fn test_unicast_to_dead_target_is_discarded() {
        let manager = SessionManager::new();
        let (a, mut a_rx) = session();
        manager.register(a.clone()).unwrap();
        a.close();

        assert_eq!(manager.unicast("gone", &a).unwrap(), 0);
        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(manager.client_count().unwrap(), 0);
    }

    #[test]
    fn test_slow_session_does_not_affect_others() {
        let manager = SessionManager::new();
        let (slow, mut slow_rx) = ClientSession::new(1, None);
        let (fast, mut fast_rx) = session();
        manager.register(slow.clone()).unwrap();
        manager.register(fast.clone()).unwrap();

        assert_eq!(manager.broadcast("1").unwrap(), 2);
        assert_eq!(manager.broadcast("2").unwrap(), 1);

        assert_eq!(drain(&mut slow_rx), vec!["1"]);
        assert_eq!(drain(&mut fast_rx), vec!["1", "2"]);
        assert!(slow.is_alive());
    }

    #[test]
    fn test_output_filter_drop_blocks_all_targets() {
        let manager = SessionManager::with_filters(FilterChain::with_filters(vec![Arc::new(DropOutput)]));
        let (a, mut a_rx) = session();
        manager.register(a.clone()).unwrap();

        assert_eq!(manager.broadcast("hidden").unwrap(), 0);
        assert_eq!(manager.unicast("hidden", &a).unwrap(), 0);
        assert!(drain(&mut a_rx).is_empty());
    }

    #[test]
    fn test_register_is_unique_by_id() {
        let manager = SessionManager::new();
        let (a, _a_rx) = session();
        manager.register(a.clone()).unwrap();
        manager.register(a.clone()).unwrap();
        assert_eq!(manager.client_count().unwrap(), 1);
    }
}
