//! Dynamic port allocation and call session bookkeeping.
//!
//! Grounded on `aicc_pipeline/core/port_pool.py`'s `PortPool` and
//! `aicc_pipeline/core/call_session.py`'s `CallSession`: a `BTreeSet` takes
//! the place of Python's `set()` (so `min()` is still `O(log n)` instead of
//! a linear scan), behind a `parking_lot::Mutex` per REDESIGN FLAGS §9
//! (no `threading.Lock`-via-global, but the same fine-grained mutual
//! exclusion the teacher applies to its `CallManager` registries).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::PortPoolError;
use crate::speaker::SpeakerStats;

/// Port pool over `[start, end)`, stepping by 2 — only even ports are
/// customer-side; `agent_port = customer_port + 1`.
pub struct PortPool {
    inner: Mutex<PortPoolInner>,
}

struct PortPoolInner {
    available: BTreeSet<u16>,
    allocated: HashMap<String, (u16, u16)>,
    port_to_call: HashMap<u16, String>,
}

impl PortPool {
    pub fn new(start: u16, end: u16) -> Self {
        let available: BTreeSet<u16> = (start..end).step_by(2).collect();
        tracing::info!(pairs = available.len(), "port pool initialized");
        Self { inner: Mutex::new(PortPoolInner { available, allocated: HashMap::new(), port_to_call: HashMap::new() }) }
    }

    /// Allocates a `(customer_port, agent_port)` pair for `call_id`. Returns
    /// the existing assignment if `call_id` was already allocated, rather
    /// than allocating twice (spec.md §4.10).
    pub fn allocate(&self, call_id: &str) -> Result<(u16, u16), PortPoolError> {
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.allocated.get(call_id) {
            return Ok(*existing);
        }

        let customer_port = *inner.available.iter().next().ok_or(PortPoolError::Exhausted)?;
        inner.available.remove(&customer_port);
        let agent_port = customer_port + 1;

        inner.allocated.insert(call_id.to_string(), (customer_port, agent_port));
        inner.port_to_call.insert(customer_port, call_id.to_string());
        inner.port_to_call.insert(agent_port, call_id.to_string());

        tracing::info!(call_id, customer_port, agent_port, "allocated port pair");
        Ok((customer_port, agent_port))
    }

    pub fn release(&self, call_id: &str) {
        let mut inner = self.inner.lock();
        if let Some((customer_port, agent_port)) = inner.allocated.remove(call_id) {
            inner.port_to_call.remove(&customer_port);
            inner.port_to_call.remove(&agent_port);
            inner.available.insert(customer_port);
            tracing::info!(call_id, customer_port, agent_port, "released port pair");
        }
    }

    pub fn call_id_by_port(&self, port: u16) -> Option<String> {
        self.inner.lock().port_to_call.get(&port).cloned()
    }

    pub fn available_count(&self) -> usize {
        self.inner.lock().available.len()
    }

    pub fn allocated_count(&self) -> usize {
        self.inner.lock().allocated.len()
    }
}

/// Snapshot of one call's state, returned by the REST admission API.
#[derive(Debug, Clone, Serialize)]
pub struct CallSessionSnapshot {
    pub call_id: String,
    pub customer_port: u16,
    pub agent_port: u16,
    pub customer_number: Option<String>,
    pub agent_id: Option<String>,
    pub start_time: DateTime<Utc>,
}

pub struct CallSession {
    pub call_id: String,
    pub customer_port: u16,
    pub agent_port: u16,
    pub customer_number: Option<String>,
    pub agent_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub customer_stats: Mutex<Option<SpeakerStats>>,
    pub agent_stats: Mutex<Option<SpeakerStats>>,
}

impl CallSession {
    pub fn new(call_id: String, customer_port: u16, agent_port: u16, customer_number: Option<String>, agent_id: Option<String>) -> Self {
        Self {
            call_id,
            customer_port,
            agent_port,
            customer_number,
            agent_id,
            start_time: Utc::now(),
            customer_stats: Mutex::new(None),
            agent_stats: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> CallSessionSnapshot {
        CallSessionSnapshot {
            call_id: self.call_id.clone(),
            customer_port: self.customer_port,
            agent_port: self.agent_port,
            customer_number: self.customer_number.clone(),
            agent_id: self.agent_id.clone(),
            start_time: self.start_time,
        }
    }
}

/// `call_id -> CallSession` mapping, with the same mutex-ordering discipline
/// as [`PortPool`] (spec.md §5: both acquired in the same order to avoid
/// deadlock — in practice callers never hold both at once).
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<CallSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session, returning the existing one on a duplicate
    /// `call_id` instead of overwriting it.
    pub fn register(&self, session: CallSession) -> Arc<CallSession> {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(&session.call_id) {
            return existing.clone();
        }
        let session = Arc::new(session);
        sessions.insert(session.call_id.clone(), session.clone());
        session
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.lock().get(call_id).cloned()
    }

    pub fn remove(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.lock().remove(call_id)
    }

    pub fn list(&self) -> Vec<CallSessionSnapshot> {
        self.sessions.lock().values().map(|s| s.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_picks_minimum_available_port() {
        let pool = PortPool::new(30000, 30010);
        let (customer, agent) = pool.allocate("call-1").unwrap();
        assert_eq!(customer, 30000);
        assert_eq!(agent, 30001);
    }

    #[test]
    fn duplicate_allocate_returns_same_assignment() {
        let pool = PortPool::new(30000, 30010);
        let first = pool.allocate("call-1").unwrap();
        let second = pool.allocate("call-1").unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.allocated_count(), 1);
    }

    #[test]
    fn exhausted_pool_errors() {
        let pool = PortPool::new(30000, 30002);
        pool.allocate("call-1").unwrap();
        assert!(matches!(pool.allocate("call-2"), Err(PortPoolError::Exhausted)));
    }

    #[test]
    fn release_returns_port_to_pool() {
        let pool = PortPool::new(30000, 30004);
        pool.allocate("call-1").unwrap();
        assert_eq!(pool.available_count(), 1);
        pool.release("call-1");
        assert_eq!(pool.available_count(), 2);
        assert_eq!(pool.allocated_count(), 0);
    }

    #[test]
    fn call_id_lookup_by_port() {
        let pool = PortPool::new(30000, 30004);
        let (customer, agent) = pool.allocate("call-1").unwrap();
        assert_eq!(pool.call_id_by_port(customer).as_deref(), Some("call-1"));
        assert_eq!(pool.call_id_by_port(agent).as_deref(), Some("call-1"));
    }

    #[test]
    fn registry_register_is_idempotent_on_duplicate_call_id() {
        let registry = SessionRegistry::new();
        let a = registry.register(CallSession::new("call-1".to_string(), 30000, 30001, None, None));
        let b = registry.register(CallSession::new("call-1".to_string(), 40000, 40001, None, None));
        assert_eq!(a.customer_port, b.customer_port);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_remove_and_get() {
        let registry = SessionRegistry::new();
        registry.register(CallSession::new("call-1".to_string(), 30000, 30001, None, None));
        assert!(registry.get("call-1").is_some());
        registry.remove("call-1");
        assert!(registry.get("call-1").is_none());
    }
}
