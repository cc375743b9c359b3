//! Per-channel socket/liveness state machine (spec §4.G):
//!
//! ```text
//! WAITING_SOCKET --bind success--> RECEIVING
//! any           --bind failure--> WAITING_SOCKET
//! RECEIVING     --no datagram for UDP_TIMEOUT_SEC--> OFFLINE_PENDING
//! OFFLINE_PENDING --next tick--> OFFLINE_ACTIVE (emit OFFLINE alert)
//! OFFLINE_ACTIVE --datagram received--> RECEIVING (resolve OFFLINE)
//! ```

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    WaitingSocket,
    Receiving,
    OfflinePending,
    OfflineActive,
}

impl MonitorState {
    pub fn on_bind_success(self) -> Self {
        MonitorState::Receiving
    }

    pub fn on_bind_failure(self) -> Self {
        MonitorState::WaitingSocket
    }

    pub fn on_datagram_received(self) -> Self {
        MonitorState::Receiving
    }

    /// Called when a receive deadline elapses with no datagram.
    pub fn on_receive_timeout(self) -> Self {
        match self {
            MonitorState::Receiving => MonitorState::OfflinePending,
            // Already pending/active: a further timeout during the same
            // or a later tick simply confirms the condition.
            MonitorState::OfflinePending => MonitorState::OfflineActive,
            other => other,
        }
    }

    /// True once the channel should be reported OFFLINE in this tick's
    /// metrics (spec §4.G step 4: OFFLINE_PENDING becomes active "next
    /// tick", so both OFFLINE_PENDING and OFFLINE_ACTIVE already read as
    /// offline for metrics purposes — the alert itself is only inserted
    /// once, on the OFFLINE_ACTIVE transition).
    pub fn is_offline(self) -> bool {
        matches!(self, MonitorState::OfflinePending | MonitorState::OfflineActive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_sequence_reaches_offline_active() {
        let mut state = MonitorState::Receiving;
        assert!(!state.is_offline());

        state = state.on_receive_timeout();
        assert_eq!(state, MonitorState::OfflinePending);
        assert!(state.is_offline());

        state = state.on_receive_timeout();
        assert_eq!(state, MonitorState::OfflineActive);
        assert!(state.is_offline());
    }

    #[test]
    fn datagram_resolves_offline_back_to_receiving() {
        let state = MonitorState::OfflineActive.on_datagram_received();
        assert_eq!(state, MonitorState::Receiving);
    }

    #[test]
    fn bind_failure_returns_to_waiting_socket_from_any_state() {
        assert_eq!(
            MonitorState::OfflineActive.on_bind_failure(),
            MonitorState::WaitingSocket
        );
    }
}
