//! Background save worker.
//!
//! One worker per session, fed through a `watch` channel so only the newest
//! snapshot is ever pending: a burst of updates while a save is in flight
//! collapses into a single follow-up save. Nothing is persisted until the
//! persister is armed with an identity (after the initial load resolves);
//! requests made before that are discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::gateway::{IdentityId, PersistenceGateway};
use crate::types::UserState;

#[derive(Clone)]
struct SaveRequest {
    seq: u64,
    state: Arc<UserState>,
}

struct Armed {
    identity: IdentityId,
    tx: watch::Sender<Option<SaveRequest>>,
    done: watch::Receiver<u64>,
    _worker: JoinHandle<()>,
}

pub struct Persister {
    gateway: Arc<dyn PersistenceGateway>,
    armed: Mutex<Option<Armed>>,
    seq: AtomicU64,
}

impl Persister {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            gateway,
            armed: Mutex::new(None),
            seq: AtomicU64::new(0),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.lock().is_some()
    }

    /// Start persisting for `identity`. Must be called from within a tokio runtime.
    /// Arming twice keeps the first identity.
    pub fn arm(&self, identity: IdentityId) {
        let mut armed = self.armed.lock();
        if let Some(current) = armed.as_ref() {
            if current.identity != identity {
                log::warn!(
                    "Persister already armed for {}; ignoring {}",
                    current.identity,
                    identity
                );
            }
            return;
        }

        let (tx, rx) = watch::channel(None);
        let (done_tx, done_rx) = watch::channel(0u64);
        let worker = tokio::spawn(run_save_worker(
            self.gateway.clone(),
            identity.clone(),
            rx,
            done_tx,
        ));
        log::info!("Persister armed for {identity}");
        *armed = Some(Armed {
            identity,
            tx,
            done: done_rx,
            _worker: worker,
        });
    }

    /// Queue `state` for saving, superseding anything not yet picked up.
    /// Returns false when disarmed (the request is dropped).
    pub fn request(&self, state: Arc<UserState>) -> bool {
        let armed = self.armed.lock();
        let Some(armed) = armed.as_ref() else {
            log::debug!("Persister disarmed; discarding save request");
            return false;
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        armed.tx.send_replace(Some(SaveRequest { seq, state }));
        true
    }

    /// Wait until every accepted request has been saved (or superseded and saved).
    pub async fn flush(&self) {
        let (target, mut done) = {
            let armed = self.armed.lock();
            match armed.as_ref() {
                Some(a) => (self.seq.load(Ordering::SeqCst), a.done.clone()),
                None => return,
            }
        };
        if target == 0 {
            return;
        }
        if done.wait_for(|completed| *completed >= target).await.is_err() {
            log::warn!("Save worker stopped before flush completed");
        }
    }
}

async fn run_save_worker(
    gateway: Arc<dyn PersistenceGateway>,
    identity: IdentityId,
    mut rx: watch::Receiver<Option<SaveRequest>>,
    done: watch::Sender<u64>,
) {
    loop {
        if rx.changed().await.is_err() {
            log::debug!("Save worker: channel closed, exiting");
            break;
        }
        let Some(request) = rx.borrow_and_update().clone() else {
            continue;
        };

        match gateway.save_state(&identity, &request.state).await {
            Ok(()) => log::debug!("Save worker: saved snapshot #{}", request.seq),
            // Not retried: the next state change saves the whole aggregate again.
            Err(e) => log::warn!("Save worker: snapshot #{} failed: {}", request.seq, e),
        }
        done.send_replace(request.seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::test_utils::RecordingGateway;
    use crate::types::StatePatch;

    fn state_with_insight(insight: &str) -> Arc<UserState> {
        Arc::new(
            StatePatch {
                ai_insight: Some(insight.to_string()),
                ..Default::default()
            }
            .apply(&UserState::default()),
        )
    }

    #[tokio::test]
    async fn test_disarmed_requests_are_discarded() {
        let gateway = RecordingGateway::new();
        let persister = Persister::new(gateway.clone());
        assert!(!persister.request(state_with_insight("early")));
        persister.flush().await;

        persister.arm(IdentityId::new("local"));
        persister.flush().await;
        assert_eq!(gateway.saves(), 0);
        assert!(gateway.stored().await.is_none());
    }

    #[tokio::test]
    async fn test_flush_waits_for_save() {
        let gateway = RecordingGateway::new();
        let persister = Persister::new(gateway.clone());
        persister.arm(IdentityId::new("local"));
        assert!(persister.request(state_with_insight("saved")));
        persister.flush().await;
        assert_eq!(gateway.stored().await.unwrap().ai_insight, "saved");
    }

    #[tokio::test]
    async fn test_burst_collapses_to_latest() {
        let gateway = RecordingGateway::new();
        gateway.save_delay_ms.store(50, Ordering::SeqCst);
        let persister = Persister::new(gateway.clone());
        persister.arm(IdentityId::new("local"));

        persister.request(state_with_insight("v1"));
        // Let the worker pick up v1 and start its slow save.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        for i in 2..=10 {
            persister.request(state_with_insight(&format!("v{i}")));
        }
        persister.flush().await;

        assert_eq!(gateway.stored().await.unwrap().ai_insight, "v10");
        assert!(gateway.saves() <= 2, "saves = {}", gateway.saves());
    }

    #[tokio::test]
    async fn test_second_arm_keeps_first_identity() {
        let gateway = RecordingGateway::new();
        let persister = Persister::new(gateway.clone());
        persister.arm(IdentityId::new("local"));
        persister.arm(IdentityId::new("someone-else"));
        assert!(persister.is_armed());
        assert_eq!(
            persister.armed.lock().as_ref().unwrap().identity.as_str(),
            "local"
        );
    }
}
