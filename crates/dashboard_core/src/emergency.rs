//! Confirm-then-send flow for the SOS alert.

use tracing::{debug, info};

use crate::error::EmergencyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftTicket(u64);

/// Identifies one delivery attempt of a confirmed alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTicket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmergencyState {
    Idle,
    Drafting { ticket: DraftTicket },
    PendingConfirmation { draft: String },
    Confirmed { alert: String },
}

impl EmergencyState {
    pub fn name(&self) -> &'static str {
        match self {
            EmergencyState::Idle => "idle",
            EmergencyState::Drafting { .. } => "drafting",
            EmergencyState::PendingConfirmation { .. } => "pending confirmation",
            EmergencyState::Confirmed { .. } => "confirmed",
        }
    }
}

#[derive(Debug)]
pub struct EmergencyDraftFlow {
    state: EmergencyState,
    next_ticket: u64,
    dispatching: Option<DispatchTicket>,
}

impl Default for EmergencyDraftFlow {
    fn default() -> Self {
        Self {
            state: EmergencyState::Idle,
            next_ticket: 0,
            dispatching: None,
        }
    }
}

impl EmergencyDraftFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EmergencyState {
        &self.state
    }

    pub fn begin_draft(&mut self) -> Result<DraftTicket, EmergencyError> {
        if self.state != EmergencyState::Idle {
            return Err(self.invalid("raise an alert"));
        }
        self.next_ticket += 1;
        let ticket = DraftTicket(self.next_ticket);
        self.state = EmergencyState::Drafting { ticket };
        Ok(ticket)
    }

    /// Applies the generator outcome if the flow is still waiting on `ticket`.
    /// A failed draft returns the flow to idle.
    pub fn draft_ready(
        &mut self,
        ticket: DraftTicket,
        outcome: anyhow::Result<String>,
    ) -> Result<String, EmergencyError> {
        if self.state != (EmergencyState::Drafting { ticket }) {
            debug!(ticket = ticket.0, "discarding stale emergency draft");
            return Err(EmergencyError::Stale);
        }

        match outcome {
            Ok(draft) => {
                self.state = EmergencyState::PendingConfirmation {
                    draft: draft.clone(),
                };
                Ok(draft)
            }
            Err(err) => {
                self.state = EmergencyState::Idle;
                Err(EmergencyError::Draft(format!("{err:#}")))
            }
        }
    }

    /// Moves to `Confirmed` and hands back the alert to dispatch along with
    /// the ticket its outcome must be reported under. Succeeds at most once
    /// per draft.
    pub fn confirm(&mut self) -> Result<(DispatchTicket, String), EmergencyError> {
        let EmergencyState::PendingConfirmation { draft } = &self.state else {
            return Err(self.invalid("confirm"));
        };
        let alert = draft.clone();
        self.state = EmergencyState::Confirmed {
            alert: alert.clone(),
        };
        self.next_ticket += 1;
        let ticket = DispatchTicket(self.next_ticket);
        self.dispatching = Some(ticket);
        info!(ticket = ticket.0, "emergency alert confirmed");
        Ok((ticket, alert))
    }

    pub fn dispatch_delivered(&mut self, ticket: DispatchTicket) {
        if self.dispatching == Some(ticket) {
            self.dispatching = None;
        }
    }

    /// Puts a confirmed alert whose delivery failed back in front of the user.
    /// A failure reported under any ticket but the outstanding one leaves the
    /// flow alone; returns whether the state changed.
    pub fn dispatch_failed(&mut self, ticket: DispatchTicket) -> bool {
        if self.dispatching != Some(ticket) {
            debug!(ticket = ticket.0, "ignoring failure of a superseded dispatch");
            return false;
        }
        self.dispatching = None;
        let EmergencyState::Confirmed { alert } = &self.state else {
            return false;
        };
        self.state = EmergencyState::PendingConfirmation {
            draft: alert.clone(),
        };
        true
    }

    /// Discards any draft. Returns whether there was anything to discard.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            EmergencyState::Drafting { .. } | EmergencyState::PendingConfirmation { .. } => {
                self.state = EmergencyState::Idle;
                true
            }
            EmergencyState::Idle | EmergencyState::Confirmed { .. } => false,
        }
    }

    pub fn dismiss(&mut self) -> Result<(), EmergencyError> {
        if !matches!(self.state, EmergencyState::Confirmed { .. }) {
            return Err(self.invalid("dismiss"));
        }
        self.state = EmergencyState::Idle;
        self.dispatching = None;
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> EmergencyError {
        EmergencyError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }
}

#[cfg(test)]
#[path = "tests/emergency_tests.rs"]
mod tests;
