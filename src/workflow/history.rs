//! Read-only view over past wheel snapshots.

use serde::Serialize;

use crate::types::{HistoryEntry, UserState};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    /// Newest first.
    pub entries: Vec<HistoryEntry>,
    pub count: usize,
    /// Mean of every entry's average, `None` without history.
    pub global_mean: Option<f64>,
}

pub fn history_summary(state: &UserState) -> HistorySummary {
    let mut entries = state.history.clone();
    entries.sort_by(|a, b| b.date.cmp(&a.date));
    let count = entries.len();
    let global_mean = if count == 0 {
        None
    } else {
        Some(entries.iter().map(|e| e.avg_score).sum::<f64>() / count as f64)
    };
    HistorySummary {
        entries,
        count,
        global_mean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{default_wheel, ONBOARDING_STEP};

    #[test]
    fn test_empty_history() {
        let summary = history_summary(&UserState::default());
        assert_eq!(summary.count, 0);
        assert_eq!(summary.global_mean, None);
    }

    #[test]
    fn test_mean_and_order() {
        let low = HistoryEntry::snapshot_at(&default_wheel(), "2025-01-01T00:00:00Z".parse().unwrap());
        let mut wheel = default_wheel();
        for a in &mut wheel {
            a.set_score(7.0, ONBOARDING_STEP).unwrap();
        }
        let high = HistoryEntry::snapshot_at(&wheel, "2025-01-08T00:00:00Z".parse().unwrap());
        let state = UserState {
            has_completed_onboarding: true,
            history: vec![low.clone(), high.clone()],
            ..Default::default()
        };
        let summary = history_summary(&state);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.entries[0], high);
        assert_eq!(summary.global_mean, Some(6.0));
    }
}
