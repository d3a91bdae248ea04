//! Two-step, user-confirmed cancellation.

/// Phase of the cancellation flow. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPhase {
    #[default]
    Idle,
    /// Confirmation modal is open.
    Confirming,
    /// Mutation in flight. Modal stays open with a busy indicator.
    Submitting,
}

impl CancelPhase {
    pub fn modal_open(&self) -> bool {
        !matches!(self, CancelPhase::Idle)
    }
}

#[derive(Debug, Default)]
pub struct CancelCoordinator {
    phase: CancelPhase,
}

impl CancelCoordinator {
    pub fn phase(&self) -> CancelPhase {
        self.phase
    }

    /// Open the confirmation modal. Returns false if nothing changed.
    pub fn request(&mut self, eligible: bool) -> bool {
        if self.phase == CancelPhase::Idle && eligible {
            self.phase = CancelPhase::Confirming;
            return true;
        }
        false
    }

    /// Close the modal without contacting the backend.
    pub fn dismiss(&mut self) -> bool {
        if self.phase == CancelPhase::Confirming {
            self.phase = CancelPhase::Idle;
            return true;
        }
        false
    }

    /// Returns true exactly when the caller must issue the mutation.
    pub fn confirm(&mut self) -> bool {
        if self.phase == CancelPhase::Confirming {
            self.phase = CancelPhase::Submitting;
            return true;
        }
        false
    }

    /// The mutation settled, whatever its outcome. Returns true exactly when
    /// the caller must issue the follow-up fetch.
    pub fn settle(&mut self) -> bool {
        if self.phase == CancelPhase::Submitting {
            self.phase = CancelPhase::Idle;
            return true;
        }
        false
    }
}
