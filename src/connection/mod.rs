//! Remote connection and stream lifecycle

pub mod machine;
pub mod state;

pub use machine::ConnectionStateMachine;
pub use state::{ContextState, StreamState};
