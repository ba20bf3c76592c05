//! Flow state machine using rust-fsm.
//!
//! One machine runs per session bootstrap and then lives inside the
//! [`Account`](crate::Account) it produced.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │      Start      │ (initial)
//! └───┬─────────┬───┘
//!     │         │ NoPersistedState
//!     │         ▼
//!     │   ┌─────────────────┐  PairingRequested  ┌─────────────────┐
//!     │   │    NeedFlow     │ ─────────────────► │   PairingFlow   │
//!     │   └────────┬────────┘                    └────────┬────────┘
//!     │            │ StandardRequested                    │ FlowStarted
//!     │            ▼                                      │
//!     │   ┌─────────────────┐                             │
//!     │   │  StandardFlow   │                             │
//!     │   └────────┬────────┘                             │
//!     │            │ ConfigResolved                       │
//!     │            ▼                                      ▼
//!     │   ┌─────────────────┐   FlowStarted     ┌──────────────────┐
//!     │   │      Idle       │ ────────────────► │ AwaitingRedirect │ ◄─┐ FlowStarted
//!     │   └─────────────────┘                   └───┬──────────┬───┘ ──┘
//!     │                                             │          │ CompletionFailed
//!     │ PersistedStateFound     CompletionSucceeded │          ▼
//!     ▼                                             ▼     ┌──────────┐
//! ┌─────────────────┐                  ┌───────────────┐  │  Failed  │ ─► FlowStarted
//! │    Restored     │                  │ Authenticated │  └──────────┘
//! └─────────────────┘                  └───────────────┘
//!
//!            any state ── Discard ──► Discarded
//! ```

use crate::error::{FlowError, FlowResult};
use rust_fsm::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub flow_machine(Start)

    Start => {
        PersistedStateFound => Restored,
        NoPersistedState => NeedFlow,
        Discard => Discarded
    },
    NeedFlow => {
        PairingRequested => PairingFlow,
        StandardRequested => StandardFlow,
        Discard => Discarded
    },
    PairingFlow => {
        FlowStarted => AwaitingRedirect,
        Discard => Discarded
    },
    StandardFlow => {
        ConfigResolved => Idle,
        Discard => Discarded
    },
    Idle => {
        FlowStarted => AwaitingRedirect,
        Discard => Discarded
    },
    AwaitingRedirect => {
        // Last writer wins: a second begin replaces the pending nonce
        FlowStarted => AwaitingRedirect,
        CompletionSucceeded => Authenticated,
        CompletionFailed => Failed,
        Discard => Discarded
    },
    Failed => {
        FlowStarted => AwaitingRedirect,
        CompletionFailed => Failed,
        Discard => Discarded
    },
    Restored => {
        Discard => Discarded
    },
    Authenticated => {
        Discard => Discarded
    },
    Discarded => {
        Discard => Discarded
    }
}

pub use flow_machine::Input as FlowMachineInput;
pub use flow_machine::State as FlowMachineState;
pub use flow_machine::StateMachine as FlowMachine;

/// Flow state for logging, CLI output, and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// Bootstrap has not looked at persisted state yet.
    Start,
    /// No usable persisted state; a flow is required.
    NeedFlow,
    /// Resolving the pairing configuration.
    PairingFlow,
    /// Resolving the standard configuration.
    StandardFlow,
    /// Pending account ready; nothing started.
    Idle,
    /// An authorization URL has been issued and a redirect is expected.
    AwaitingRedirect,
    /// The last completion attempt failed; the account is still pending.
    Failed,
    /// Authenticated account recovered from persisted state.
    Restored,
    /// Authenticated by completing a flow in this session.
    Authenticated,
    /// Released by logout or shutdown.
    Discarded,
}

impl FlowState {
    /// Returns true for the two terminal-success states.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, FlowState::Restored | FlowState::Authenticated)
    }

    /// Returns true if a new authorization URL may be issued from this state.
    pub fn can_begin_flow(&self) -> bool {
        matches!(
            self,
            FlowState::PairingFlow
                | FlowState::Idle
                | FlowState::AwaitingRedirect
                | FlowState::Failed
        )
    }
}

impl From<&FlowMachineState> for FlowState {
    fn from(state: &FlowMachineState) -> Self {
        match state {
            FlowMachineState::Start => FlowState::Start,
            FlowMachineState::NeedFlow => FlowState::NeedFlow,
            FlowMachineState::PairingFlow => FlowState::PairingFlow,
            FlowMachineState::StandardFlow => FlowState::StandardFlow,
            FlowMachineState::Idle => FlowState::Idle,
            FlowMachineState::AwaitingRedirect => FlowState::AwaitingRedirect,
            FlowMachineState::Failed => FlowState::Failed,
            FlowMachineState::Restored => FlowState::Restored,
            FlowMachineState::Authenticated => FlowState::Authenticated,
            FlowMachineState::Discarded => FlowState::Discarded,
        }
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlowState::Start => "start",
            FlowState::NeedFlow => "need_flow",
            FlowState::PairingFlow => "pairing_flow",
            FlowState::StandardFlow => "standard_flow",
            FlowState::Idle => "idle",
            FlowState::AwaitingRedirect => "awaiting_redirect",
            FlowState::Failed => "failed",
            FlowState::Restored => "restored",
            FlowState::Authenticated => "authenticated",
            FlowState::Discarded => "discarded",
        };
        f.write_str(name)
    }
}

/// Wraps the generated machine so refused inputs become [`FlowError`]s.
pub struct FlowTracker {
    machine: FlowMachine,
}

impl Default for FlowTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FlowTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowTracker")
            .field("state", &self.state())
            .finish()
    }
}

impl FlowTracker {
    /// Create a tracker in the `Start` state.
    pub fn new() -> Self {
        Self {
            machine: FlowMachine::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> FlowState {
        FlowState::from(self.machine.state())
    }

    /// Apply an input, failing with `InvalidStateTransition` if the machine refuses it.
    pub fn transition(&mut self, input: FlowMachineInput) -> FlowResult<FlowState> {
        let from = self.state();
        self.machine.consume(&input).map_err(|_| {
            FlowError::InvalidStateTransition(format!("{:?} is not allowed from {}", input, from))
        })?;
        let to = self.state();
        debug!(%from, %to, ?input, "Flow state transition");
        Ok(to)
    }
}
