//! Weekly review: re-rate the wheel after a completed cycle.
//!
//! The review is gated on the task list: it opens only when nothing is
//! pending. Saving snapshots the new wheel into history and starts the
//! next cycle with fresh tasks.

use serde::Serialize;

use crate::error::AppError;
use crate::types::{weekly_gate, HistoryEntry, LifeArea, SmartTask, UserState, REVIEW_STEP};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WeeklyAccess {
    Open,
    Locked,
}

pub fn weekly_access(tasks: &[SmartTask]) -> WeeklyAccess {
    if weekly_gate(tasks) {
        WeeklyAccess::Open
    } else {
        WeeklyAccess::Locked
    }
}

/// Scores being edited in an open review. The committed wheel is untouched
/// until the review is saved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyDraft {
    previous: Vec<LifeArea>,
    wheel: Vec<LifeArea>,
}

impl WeeklyDraft {
    pub fn new(current: &[LifeArea]) -> Self {
        Self {
            previous: current.to_vec(),
            wheel: current.to_vec(),
        }
    }

    pub fn previous(&self) -> &[LifeArea] {
        &self.previous
    }

    pub fn wheel(&self) -> &[LifeArea] {
        &self.wheel
    }

    /// Rate one area in tenth-point steps.
    pub fn set_score(&mut self, area_id: &str, score: f64) -> Result<(), AppError> {
        let area = self
            .wheel
            .iter_mut()
            .find(|a| a.id == area_id)
            .ok_or_else(|| AppError::NotFound(format!("area {area_id}")))?;
        area.set_score(score, REVIEW_STEP)
    }
}

/// State after a saved review: the snapshot's wheel becomes current, fresh
/// tasks replace the finished ones, and the snapshot is prepended to history.
pub fn complete_review(
    base: &UserState,
    snapshot: HistoryEntry,
    evolution_insight: String,
    tasks: Vec<SmartTask>,
) -> UserState {
    let wheel = snapshot.wheel.clone();
    let mut history = Vec::with_capacity(base.history.len() + 1);
    history.push(snapshot);
    history.extend(base.history.iter().cloned());

    UserState {
        has_completed_onboarding: base.has_completed_onboarding,
        current_wheel: wheel,
        daily_tasks: tasks,
        ai_insight: evolution_insight,
        history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{default_wheel, mean_score};

    fn task(completed: bool) -> SmartTask {
        let mut t = SmartTask::new("Walk", "", "", "").unwrap();
        t.completed = completed;
        t
    }

    #[test]
    fn test_access_gate() {
        assert_eq!(weekly_access(&[]), WeeklyAccess::Open);
        assert_eq!(weekly_access(&[task(true)]), WeeklyAccess::Open);
        assert_eq!(weekly_access(&[task(true), task(false)]), WeeklyAccess::Locked);
    }

    #[test]
    fn test_draft_edits_do_not_touch_previous() {
        let mut draft = WeeklyDraft::new(&default_wheel());
        draft.set_score("2", 7.3).unwrap();
        assert_eq!(draft.wheel()[1].score(), 7.3);
        assert_eq!(draft.previous()[1].score(), 5.0);
    }

    #[test]
    fn test_draft_rejects_unknown_area_and_bad_score() {
        let mut draft = WeeklyDraft::new(&default_wheel());
        assert!(matches!(draft.set_score("99", 5.0), Err(AppError::NotFound(_))));
        assert!(matches!(draft.set_score("1", 10.1), Err(AppError::Validation(_))));
        assert!(matches!(draft.set_score("1", 7.25), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_complete_review_prepends_history() {
        let old_entry = HistoryEntry::snapshot(&default_wheel());
        let base = UserState {
            has_completed_onboarding: true,
            daily_tasks: vec![task(true)],
            history: vec![old_entry.clone()],
            ..Default::default()
        };
        let mut draft = WeeklyDraft::new(&base.current_wheel);
        draft.set_score("1", 8.0).unwrap();
        let new_tasks = vec![task(false)];

        let entry = HistoryEntry::snapshot(draft.wheel());
        let state = complete_review(&base, entry.clone(), "You grew.".to_string(), new_tasks.clone());
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[0], entry);
        assert_eq!(state.history[1], old_entry);
        assert_eq!(state.current_wheel[0].score(), 8.0);
        assert_eq!(state.daily_tasks, new_tasks);
        assert_eq!(state.ai_insight, "You grew.");
        assert!((entry.avg_score - mean_score(&state.current_wheel)).abs() < 1e-9);
    }
}
