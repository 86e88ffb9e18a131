//! Proportional distribution rounds.
//!
//! Each round is a pure function from one [`RoundState`] to the next. The
//! driver [`distribute`] folds rounds until a terminal state is reached.

use rust_decimal::Decimal;

use crate::domain::money::saturating_sum;
use crate::domain::ResolvedPolicy;

/// Per-policy accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicySlot {
    pub amount: Decimal,
    /// Still eligible; cleared by a floor deactivation
    pub active: bool,
    /// Can take no more this run
    pub saturated: bool,
}

impl PolicySlot {
    #[inline]
    fn eligible(&self) -> bool {
        self.active && !self.saturated
    }
}

/// Immutable snapshot between rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundState {
    /// One slot per policy, same order as the policy list
    pub slots: Vec<PolicySlot>,
    /// Pool left to distribute
    pub remaining: Decimal,
}

/// Result of applying one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    Continue(RoundState),
    Done(RoundState),
}

impl RoundState {
    /// Starting state: nothing assigned, policies without capacity saturated.
    pub fn initial(policies: &[ResolvedPolicy], total: Decimal, tolerance: Decimal) -> Self {
        let slots = policies
            .iter()
            .map(|policy| {
                let has_capacity = policy.has_capacity(tolerance);
                PolicySlot {
                    amount: Decimal::ZERO,
                    active: has_capacity,
                    saturated: !has_capacity,
                }
            })
            .collect();

        RoundState {
            slots,
            remaining: total,
        }
    }

    /// Apply one distribution round.
    ///
    /// Every eligible policy is offered `pool * (weight / weight_sum)` of the
    /// pool as it stood at the start of the round, limited by its remaining
    /// capacity. Policies holding a nonzero amount below their floor are then
    /// deactivated and their amount returned to the pool.
    pub fn step(&self, policies: &[ResolvedPolicy], tolerance: Decimal) -> RoundOutcome {
        if self.remaining <= tolerance {
            return RoundOutcome::Done(self.clone());
        }

        let weight_sum = saturating_sum(
            self.slots
                .iter()
                .zip(policies)
                .filter(|(slot, _)| slot.eligible())
                .map(|(_, policy)| policy.weight),
        );

        if weight_sum <= tolerance {
            return RoundOutcome::Done(self.clone());
        }

        let pool = self.remaining;
        let mut remaining = self.remaining;
        let mut distributed = Decimal::ZERO;

        let mut slots: Vec<PolicySlot> = self
            .slots
            .iter()
            .zip(policies)
            .map(|(slot, policy)| {
                if !slot.eligible() {
                    return *slot;
                }

                // The weight ratio is at most one, so a share never exceeds the pool
                let share = pool * (policy.weight / weight_sum);
                let assignable = match policy.remaining_capacity(slot.amount) {
                    Some(available) => share.min(available),
                    None => share,
                };

                if assignable <= tolerance {
                    return PolicySlot {
                        saturated: true,
                        ..*slot
                    };
                }

                let amount = slot.amount + assignable;
                remaining -= assignable;
                distributed += assignable;

                let saturated = policy
                    .remaining_capacity(amount)
                    .is_some_and(|left| left <= tolerance);

                PolicySlot {
                    amount,
                    active: true,
                    saturated,
                }
            })
            .collect();

        if distributed <= tolerance {
            return RoundOutcome::Done(RoundState { slots, remaining });
        }

        for (slot, policy) in slots.iter_mut().zip(policies) {
            if slot.active && below_floor(slot.amount, policy.floor, tolerance) {
                remaining += slot.amount;
                *slot = PolicySlot {
                    amount: Decimal::ZERO,
                    active: false,
                    saturated: true,
                };
            }
        }

        RoundOutcome::Continue(RoundState { slots, remaining })
    }
}

/// A nonzero holding that misses a positive floor.
#[inline]
fn below_floor(amount: Decimal, floor: Decimal, tolerance: Decimal) -> bool {
    floor > tolerance && amount > tolerance && amount + tolerance < floor
}

/// Run rounds from the initial state until one reports done.
///
/// Every continuing round either drains the pool, saturates a slot or
/// deactivates one, so the fold terminates.
pub fn distribute(policies: &[ResolvedPolicy], total: Decimal, tolerance: Decimal) -> RoundState {
    let mut state = RoundState::initial(policies, total, tolerance);
    loop {
        match state.step(policies, tolerance) {
            RoundOutcome::Continue(next) => state = next,
            RoundOutcome::Done(last) => return last,
        }
    }
}
