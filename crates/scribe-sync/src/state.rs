//! Uniform sync-service state machine (spec §4.6).

use std::fmt;

/// A transport-specific "live" mode label surfaced in `stats.mode`
/// (e.g. `idle`, `polling`, `daemon`, `cli`, `monitoring`, `realtime`,
/// `syncing`, `importing`).
pub type ModeLabel = &'static str;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Stopped,
    Connecting,
    PrimaryLive,
    FallbackLive,
    Reconnecting,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Stopped => "stopped",
            SyncState::Connecting => "connecting",
            SyncState::PrimaryLive => "primary_live",
            SyncState::FallbackLive => "fallback_live",
            SyncState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

impl SyncState {
    /// Whether a transition from `self` to `next` is legal under the
    /// uniform state machine (spec §4.6). `start()`/`stop()` transitions
    /// are handled by the caller directly; this only validates the
    /// connect/reconnect lattice.
    pub fn can_transition_to(self, next: SyncState) -> bool {
        use SyncState::*;
        matches!(
            (self, next),
            (Stopped, Connecting)
                | (Connecting, PrimaryLive)
                | (Connecting, FallbackLive)
                | (PrimaryLive, FallbackLive)
                | (PrimaryLive, Reconnecting)
                | (Reconnecting, PrimaryLive)
                | (Reconnecting, FallbackLive)
                | (FallbackLive, Reconnecting)
                | (_, Stopped)
        )
    }
}

/// Mutex-guarded [`SyncState`] that only ever moves through legal
/// transitions. Every per-platform adapter owns one (or one per
/// account, for email) and gates its mode changes on `transition()`'s
/// return value rather than assigning a mode label directly — this is
/// what makes the state machine load-bearing instead of a parallel
/// bookkeeping structure the services ignore.
#[derive(Debug)]
pub struct SyncStateCell {
    inner: std::sync::Mutex<SyncState>,
}

impl Default for SyncStateCell {
    fn default() -> Self {
        Self { inner: std::sync::Mutex::new(SyncState::Stopped) }
    }
}

impl SyncStateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> SyncState {
        *self.inner.lock().unwrap()
    }

    /// Attempt the transition. Applies it and returns `true` if legal
    /// under [`SyncState::can_transition_to`]; otherwise leaves the
    /// state untouched and returns `false`.
    pub fn transition(&self, next: SyncState) -> bool {
        let mut guard = self.inner.lock().unwrap();
        if guard.can_transition_to(next) {
            *guard = next;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_rejects_illegal_transitions_and_keeps_prior_state() {
        let cell = SyncStateCell::new();
        assert!(cell.transition(SyncState::Connecting));
        assert!(!cell.transition(SyncState::Reconnecting));
        assert_eq!(cell.get(), SyncState::Connecting);
        assert!(cell.transition(SyncState::PrimaryLive));
        assert_eq!(cell.get(), SyncState::PrimaryLive);
    }

    #[test]
    fn cell_tracks_fallback_round_trip_through_reconnecting() {
        let cell = SyncStateCell::new();
        cell.transition(SyncState::Connecting);
        cell.transition(SyncState::PrimaryLive);
        assert!(cell.transition(SyncState::FallbackLive));
        assert!(!cell.transition(SyncState::PrimaryLive)); // must pass through Reconnecting
        assert!(cell.transition(SyncState::Reconnecting));
        assert!(cell.transition(SyncState::PrimaryLive));
        assert_eq!(cell.get(), SyncState::PrimaryLive);
    }

    #[test]
    fn stop_is_reachable_from_every_state() {
        for state in [
            SyncState::Stopped,
            SyncState::Connecting,
            SyncState::PrimaryLive,
            SyncState::FallbackLive,
            SyncState::Reconnecting,
        ] {
            assert!(state.can_transition_to(SyncState::Stopped));
        }
    }

    #[test]
    fn connecting_only_leads_to_live_states() {
        assert!(SyncState::Connecting.can_transition_to(SyncState::PrimaryLive));
        assert!(SyncState::Connecting.can_transition_to(SyncState::FallbackLive));
        assert!(!SyncState::Connecting.can_transition_to(SyncState::Reconnecting));
    }
}
