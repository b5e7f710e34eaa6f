//! First-run assessment: eight sequential steps, one per area.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::intelligence::Guidance;
use crate::types::{HistoryEntry, LifeArea, UserState, ONBOARDING_STEP};

/// Result of moving past the current step.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Now on the given zero-based step.
    Step(usize),
    /// The last area was rated; this is the finished wheel.
    Finished(Vec<LifeArea>),
}

/// In-progress onboarding. No skipping and no going back.
#[derive(Debug, Clone, PartialEq)]
pub struct OnboardingFlow {
    step: usize,
    wheel: Vec<LifeArea>,
}

/// What views render for the current step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingProgress {
    /// One-based, for "Step 3 of 8".
    pub step: usize,
    pub total: usize,
    pub area: LifeArea,
}

impl OnboardingFlow {
    pub fn new(wheel: Vec<LifeArea>) -> Result<Self, AppError> {
        if wheel.is_empty() {
            return Err(AppError::Validation("cannot onboard an empty wheel".to_string()));
        }
        Ok(Self { step: 0, wheel })
    }

    pub fn is_last_step(&self) -> bool {
        self.step + 1 == self.wheel.len()
    }

    pub fn current_area(&self) -> &LifeArea {
        &self.wheel[self.step]
    }

    pub fn progress(&self) -> OnboardingProgress {
        OnboardingProgress {
            step: self.step + 1,
            total: self.wheel.len(),
            area: self.current_area().clone(),
        }
    }

    /// Rate the current area in half-point steps.
    pub fn set_score(&mut self, score: f64) -> Result<(), AppError> {
        self.wheel[self.step].set_score(score, ONBOARDING_STEP)
    }

    pub fn advance(&mut self) -> Advance {
        if self.is_last_step() {
            Advance::Finished(self.wheel.clone())
        } else {
            self.step += 1;
            Advance::Step(self.step)
        }
    }
}

/// Build the onboarded state and the first history snapshot from the rated
/// wheel and the guidance generated for it.
pub fn complete(
    base: &UserState,
    wheel: Vec<LifeArea>,
    guidance: Guidance,
    now: DateTime<Utc>,
) -> (UserState, HistoryEntry) {
    let entry = HistoryEntry::snapshot_at(&wheel, now);
    let mut history = Vec::with_capacity(base.history.len() + 1);
    history.push(entry.clone());
    history.extend(base.history.iter().cloned());

    let state = UserState {
        has_completed_onboarding: true,
        current_wheel: wheel,
        daily_tasks: guidance.tasks,
        ai_insight: guidance.insight,
        history,
    };
    (state, entry)
}
