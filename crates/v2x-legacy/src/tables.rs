//! Socket side tables
//!
//! The legacy API addresses flows and subscriptions by socket. These tables
//! map sockets back to the backend objects, and SPS flow ids to the caller's
//! per-flow callbacks. A flow id present in the callback table is an SPS
//! flow; every other Tx flow is an event flow.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use v2x_core::{RxSubscription, SockFd, TxFlow};

use crate::types::SpsCalls;

#[derive(Default)]
struct Tables {
    rx: HashMap<SockFd, RxSubscription>,
    tx: HashMap<SockFd, TxFlow>,
    sps_calls: HashMap<u32, Arc<dyn SpsCalls>>,
}

#[derive(Default)]
pub struct SocketTables {
    inner: Mutex<Tables>,
}

impl std::fmt::Debug for SocketTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.lock();
        f.debug_struct("SocketTables")
            .field("rx", &t.rx.len())
            .field("tx", &t.tx.len())
            .field("sps_calls", &t.sps_calls.len())
            .finish()
    }
}

impl SocketTables {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_rx(&self, sub: RxSubscription) {
        self.lock().rx.insert(sub.sock, sub);
    }

    pub fn find_rx(&self, sock: SockFd) -> Option<RxSubscription> {
        self.lock().rx.get(&sock).cloned()
    }

    pub fn remove_rx(&self, sock: SockFd) -> Option<RxSubscription> {
        self.lock().rx.remove(&sock)
    }

    pub fn add_tx(&self, flow: TxFlow) {
        self.lock().tx.insert(flow.sock, flow);
    }

    pub fn find_tx(&self, sock: SockFd) -> Option<TxFlow> {
        self.lock().tx.get(&sock).copied()
    }

    pub fn remove_tx(&self, sock: SockFd) -> Option<TxFlow> {
        self.lock().tx.remove(&sock)
    }

    pub fn add_sps_calls(&self, flow_id: u32, calls: Arc<dyn SpsCalls>) {
        self.lock().sps_calls.insert(flow_id, calls);
    }

    pub fn find_sps_calls(&self, flow_id: u32) -> Option<Arc<dyn SpsCalls>> {
        self.lock().sps_calls.get(&flow_id).cloned()
    }

    pub fn remove_sps_calls(&self, flow_id: u32) {
        self.lock().sps_calls.remove(&flow_id);
    }

    /// Whether the flow was registered as SPS
    pub fn is_sps(&self, flow_id: u32) -> bool {
        self.lock().sps_calls.contains_key(&flow_id)
    }

    pub fn tx_count(&self) -> usize {
        self.lock().tx.len()
    }

    pub fn rx_count(&self) -> usize {
        self.lock().rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NoSpsCalls;
    use std::net::{Ipv6Addr, SocketAddrV6};
    use v2x_core::{FlowKind, TrafficIpType};

    fn flow(flow_id: u32, sock: SockFd, kind: FlowKind) -> TxFlow {
        TxFlow {
            flow_id,
            kind,
            ip_type: TrafficIpType::NonIp,
            service_id: 1,
            sock,
            addr: SocketAddrV6::new(Ipv6Addr::LOCALHOST, 2500, 0, 0),
        }
    }

    #[test]
    fn test_tx_lookup_by_socket() {
        let tables = SocketTables::new();
        tables.add_tx(flow(0, 100, FlowKind::Sps));
        tables.add_tx(flow(2, 101, FlowKind::Event));

        assert_eq!(tables.find_tx(101).map(|f| f.flow_id), Some(2));
        assert_eq!(tables.tx_count(), 2);
        assert!(tables.remove_tx(100).is_some());
        assert!(tables.find_tx(100).is_none());
        assert!(tables.remove_tx(100).is_none());
    }

    #[test]
    fn test_sps_membership() {
        let tables = SocketTables::new();
        tables.add_sps_calls(0, Arc::new(NoSpsCalls));
        assert!(tables.is_sps(0));
        assert!(!tables.is_sps(2));
        tables.remove_sps_calls(0);
        assert!(tables.find_sps_calls(0).is_none());
    }

    #[test]
    fn test_rx_lookup() {
        let tables = SocketTables::new();
        tables.add_rx(RxSubscription {
            ip_type: TrafficIpType::Ip,
            ids: None,
            sock: 7,
            addr: SocketAddrV6::new(Ipv6Addr::LOCALHOST, 9000, 0, 0),
        });
        assert!(tables.find_rx(7).unwrap().is_wildcard());
        assert_eq!(tables.rx_count(), 1);
        assert!(tables.remove_rx(7).is_some());
        assert_eq!(tables.rx_count(), 0);
    }
}
