//! Two-phase commit state

use std::fmt;

/// Handle returned by `preserve`, redeemed by `save`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PreserveToken(pub u64);

impl fmt::Display for PreserveToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "preserve#{}", self.0)
    }
}

/// Pending interaction state of a change log
#[derive(Debug, Clone, PartialEq)]
pub enum CommitState<S> {
    /// No interaction in flight
    Idle,
    /// A before-snapshot waits for its matching save
    Preserved { token: PreserveToken, before: S },
}

impl<S> Default for CommitState<S> {
    fn default() -> Self {
        CommitState::Idle
    }
}

impl<S> CommitState<S> {
    pub fn is_idle(&self) -> bool {
        matches!(self, CommitState::Idle)
    }

    pub fn token(&self) -> Option<PreserveToken> {
        match self {
            CommitState::Idle => None,
            CommitState::Preserved { token, .. } => Some(*token),
        }
    }

    /// Take the preserved snapshot if `token` is the pending one
    ///
    /// Leaves the state untouched on a mismatch.
    pub fn redeem(&mut self, token: PreserveToken) -> Option<S> {
        if self.token() != Some(token) {
            return None;
        }
        match std::mem::replace(self, CommitState::Idle) {
            CommitState::Preserved { before, .. } => Some(before),
            CommitState::Idle => None,
        }
    }
}
