//! Connectivity checks and notifications

use std::sync::mpsc::Sender;

/// Cheap "are we online at all" check supplied by the host
pub trait ConnectivityCheck: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Check for hosts without a network monitor
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConnected;

impl ConnectivityCheck for AlwaysConnected {
    fn is_connected(&self) -> bool {
        true
    }
}

/// Connectivity change published to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityEvent {
    pub connected: bool,
}

/// Receiver of connectivity events (UI banner, event bus)
pub trait ConnectivityListener: Send + Sync {
    fn on_connectivity_event(&self, event: ConnectivityEvent);
}

/// Listener that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreConnectivity;

impl ConnectivityListener for IgnoreConnectivity {
    fn on_connectivity_event(&self, _event: ConnectivityEvent) {}
}

/// Forward events onto a channel; a hung-up receiver is ignored
impl ConnectivityListener for Sender<ConnectivityEvent> {
    fn on_connectivity_event(&self, event: ConnectivityEvent) {
        let _ = self.send(event);
    }
}
