//! Lifecycle states of the remote connection and its playback stream

use crate::error::StateError;

/// State of the logical session to the remote server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextState {
    Unconnected,
    Connecting,
    Authorizing,
    SettingName,
    Ready,
    Failed,
    Terminated,
}

impl ContextState {
    /// Still on the way to `Ready`
    pub fn is_pre_ready(self) -> bool {
        matches!(
            self,
            ContextState::Unconnected
                | ContextState::Connecting
                | ContextState::Authorizing
                | ContextState::SettingName
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ContextState::Failed | ContextState::Terminated)
    }

    fn progress_rank(self) -> Option<u8> {
        match self {
            ContextState::Unconnected => Some(0),
            ContextState::Connecting => Some(1),
            ContextState::Authorizing => Some(2),
            ContextState::SettingName => Some(3),
            _ => None,
        }
    }

    /// Check `self -> next` against the connection lifecycle
    ///
    /// Progress notices only move forward, `Ready` is entered from a pre-ready
    /// state, and the terminal states have no way out.
    pub fn transition(self, next: ContextState) -> Result<ContextState, StateError> {
        let allowed = match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, to) if to.is_terminal() => true,
            (from, ContextState::Ready) => from.is_pre_ready(),
            (from, to) => match (from.progress_rank(), to.progress_rank()) {
                (Some(a), Some(b)) => b > a,
                _ => false,
            },
        };

        if allowed {
            Ok(next)
        } else {
            Err(StateError::InvalidContextTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// State of the remote playback stream
///
/// Corking is orthogonal and reported by the stream while it is good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Creating,
    Ready,
    Failed,
    Terminated,
}

impl StreamState {
    pub fn is_good(self) -> bool {
        matches!(self, StreamState::Creating | StreamState::Ready)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_good()
    }

    pub fn transition(self, next: StreamState) -> Result<StreamState, StateError> {
        let allowed = match (self, next) {
            (from, _) if from.is_terminal() => false,
            (StreamState::Creating, _) => next != StreamState::Creating,
            (StreamState::Ready, to) => to.is_terminal(),
            _ => false,
        };

        if allowed {
            Ok(next)
        } else {
            Err(StateError::InvalidStreamTransition {
                from: self,
                to: next,
            })
        }
    }
}
