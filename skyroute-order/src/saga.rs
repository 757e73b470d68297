use chrono::NaiveDate;

use skyroute_core::models::TempBooking;

/// Booking saga lifecycle.
///
/// `Validating -> Reserving -> AwaitingPayment -> {Confirmed | Failed | Pending}`,
/// with early exits to `Failed`, `Reserving -> Pending` when the seat
/// decrement's effect is unknown, and `Pending` resolving to either outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Validating,
    Reserving,
    AwaitingPayment,
    Confirmed,
    Failed,
    Pending,
}

impl SagaState {
    pub fn can_transition_to(self, next: SagaState) -> bool {
        use SagaState::*;
        matches!(
            (self, next),
            (Validating, Reserving)
                | (Validating, Failed)
                | (Reserving, AwaitingPayment)
                | (Reserving, Failed)
                | (Reserving, Pending)
                | (AwaitingPayment, Confirmed)
                | (AwaitingPayment, Failed)
                | (AwaitingPayment, Pending)
                | (Pending, Confirmed)
                | (Pending, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SagaState::Confirmed | SagaState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid saga transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: SagaState,
    pub to: SagaState,
}

/// Undo step for a forward step that already took effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    ReleaseSeats {
        flight_id: i64,
        date: NaiveDate,
        seats: i32,
    },
    DiscardTempBooking {
        user_id: i64,
        flight_id: i64,
    },
}

/// State machine plus the compensations owed so far.
#[derive(Debug)]
pub struct BookingSaga {
    state: SagaState,
    history: Vec<SagaState>,
    compensations: Vec<Compensation>,
}

impl Default for BookingSaga {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingSaga {
    pub fn new() -> Self {
        Self {
            state: SagaState::Validating,
            history: vec![SagaState::Validating],
            compensations: Vec::new(),
        }
    }

    /// Rebuild a saga left `Pending`: its staging record and seat
    /// reservation are both still held.
    pub fn resume_pending(temp: &TempBooking) -> Self {
        Self {
            state: SagaState::Pending,
            history: vec![SagaState::Pending],
            compensations: vec![
                Compensation::DiscardTempBooking {
                    user_id: temp.user_id,
                    flight_id: temp.flight_id,
                },
                Compensation::ReleaseSeats {
                    flight_id: temp.flight_id,
                    date: temp.date,
                    seats: temp.seats,
                },
            ],
        }
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn history(&self) -> &[SagaState] {
        &self.history
    }

    pub fn advance(&mut self, next: SagaState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    pub fn record(&mut self, compensation: Compensation) {
        self.compensations.push(compensation);
    }

    /// Owed compensations, most recent first. Leaves none behind.
    pub fn take_compensations(&mut self) -> Vec<Compensation> {
        let mut owed = std::mem::take(&mut self.compensations);
        owed.reverse();
        owed
    }

    /// The saga's effects are now permanent; nothing is owed.
    pub fn commit(&mut self) {
        self.compensations.clear();
    }

    pub fn owes(&self) -> &[Compensation] {
        &self.compensations
    }
}
