//! Daily tracking: schedule, complete, simplify or abandon the cycle's tasks.

use serde::Serialize;

use crate::error::AppError;
use crate::types::{SmartTask, StatePatch, UserState, Weekday};

/// Insight set after the tasks were reduced to micro-habits.
pub const SIMPLIFY_INSIGHT: &str =
    "Reduced difficulty to micro-habit level. Just focus on starting.";

/// Insight set after the user abandoned the cycle.
pub const QUIT_INSIGHT: &str =
    "You gave up on the previous cycle. Start again when you are ready.";

/// Shown when a task becomes completed.
pub const CHEER_MESSAGES: [&str; 5] = [
    "Excellent progress! ✨",
    "Consistency is power. 🚀",
    "One more step towards fulfillment. 🧘",
    "Unshakable focus! 💪",
    "You are owning the day. 🔥",
];

pub fn cheer_message(n: usize) -> &'static str {
    CHEER_MESSAGES[n % CHEER_MESSAGES.len()]
}

fn position(tasks: &[SmartTask], id: &str) -> Result<usize, AppError> {
    tasks
        .iter()
        .position(|t| t.id == id)
        .ok_or_else(|| AppError::NotFound(format!("task {id}")))
}

/// Give an unscheduled task its day and time.
pub fn schedule_task(
    tasks: &[SmartTask],
    id: &str,
    day: Weekday,
    time: &str,
) -> Result<Vec<SmartTask>, AppError> {
    let idx = position(tasks, id)?;
    let mut next = tasks.to_vec();
    next[idx].schedule(day, time)?;
    Ok(next)
}

/// Flip completion of a scheduled task. Returns the new list and whether the
/// task is now completed.
pub fn toggle_task(tasks: &[SmartTask], id: &str) -> Result<(Vec<SmartTask>, bool), AppError> {
    let idx = position(tasks, id)?;
    if !tasks[idx].is_scheduled() {
        return Err(AppError::Validation(format!(
            "task {id} must be scheduled before it can be completed"
        )));
    }
    let mut next = tasks.to_vec();
    next[idx].completed = !next[idx].completed;
    let completed = next[idx].completed;
    Ok((next, completed))
}

/// Patch applied after simplification. Wheel and history stay as they are.
pub fn simplify_patch(simplified: Vec<SmartTask>) -> StatePatch {
    StatePatch {
        daily_tasks: Some(simplified),
        ai_insight: Some(SIMPLIFY_INSIGHT.to_string()),
        ..Default::default()
    }
}

/// Patch applied when the user confirms quitting. Wheel and history stay.
pub fn quit_patch() -> StatePatch {
    StatePatch {
        daily_tasks: Some(Vec::new()),
        ai_insight: Some(QUIT_INSIGHT.to_string()),
        ..Default::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub completed: usize,
    pub total: usize,
    /// Every task done (and there is at least one).
    pub cycle_complete: bool,
    /// Quitting is offered only while something is still pending.
    pub can_quit: bool,
    pub weekly_unlocked: bool,
}

pub fn daily_summary(state: &UserState) -> DailySummary {
    let total = state.daily_tasks.len();
    let completed = state.completed_count();
    DailySummary {
        completed,
        total,
        cycle_complete: total > 0 && completed == total,
        can_quit: total > 0 && completed < total,
        weekly_unlocked: state.weekly_gate_open(),
    }
}
