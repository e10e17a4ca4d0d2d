//! Coarse game-session state machine.

use serde::{Deserialize, Serialize};

/// Session phase gating whether gameplay logic runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    Ready,
    Playing,
    Paused,
    GameOver,
}

/// Every legal transition. Anything not listed here is rejected.
pub const TRANSITIONS: &[(SessionState, SessionState)] = &[
    (SessionState::Initializing, SessionState::Ready),
    (SessionState::Ready, SessionState::Playing),
    (SessionState::Playing, SessionState::Paused),
    (SessionState::Playing, SessionState::GameOver),
    (SessionState::Paused, SessionState::Playing),
    (SessionState::GameOver, SessionState::Ready),
];

/// Session state plus the counters derived from it.
///
/// One instance per running game. Physics may keep stepping in every state;
/// rule side effects (event dispatch, input) only run while
/// [`gameplay_active`](Self::gameplay_active).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFsm {
    state: SessionState,
    coins: u32,
}

impl Default for SessionFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionFsm {
    pub fn new() -> Self {
        Self {
            state: SessionState::Initializing,
            coins: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Coins collected since the session last entered `Ready`.
    pub fn coins_collected(&self) -> u32 {
        self.coins
    }

    pub fn record_coin(&mut self) {
        self.coins += 1;
    }

    /// True only while gameplay-mutating logic may run.
    pub fn gameplay_active(&self) -> bool {
        self.state == SessionState::Playing
    }

    /// Attempts a transition. Pairs outside the table are rejected with the
    /// state unchanged.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !TRANSITIONS.contains(&(self.state, next)) {
            tracing::warn!(
                "[session] rejected transition {:?} -> {next:?}",
                self.state
            );
            return false;
        }
        tracing::info!("[session] {:?} -> {next:?}", self.state);
        self.state = next;
        self.on_enter(next);
        true
    }

    /// Entry side effects, one place per state.
    fn on_enter(&mut self, state: SessionState) {
        match state {
            SessionState::Ready => {
                self.coins = 0;
            }
            SessionState::Initializing
            | SessionState::Playing
            | SessionState::Paused
            | SessionState::GameOver => {}
        }
    }
}
