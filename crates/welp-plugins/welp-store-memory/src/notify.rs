//! Notifier that logs each event and keeps it in an outbox until drained.
//! Stands in for the email/SMS/push dispatchers of a deployment.

use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;
use welp_core::{Notification, Notifier, StoreError, StoreResult};

#[derive(Default)]
pub struct OutboxNotifier {
    outbox: Mutex<Vec<Notification>>,
}

impl OutboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every notification dispatched so far.
    pub fn drain(&self) -> Vec<Notification> {
        match self.outbox.lock() {
            Ok(mut outbox) => std::mem::take(&mut *outbox),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn dispatch(&self, notification: Notification) -> StoreResult<()> {
        info!(?notification, "notification queued");
        self.outbox
            .lock()
            .map_err(|_| StoreError::Backend("notification outbox poisoned".into()))?
            .push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use welp_core::{ContentId, UserId};

    #[tokio::test]
    async fn drain_empties_the_outbox() {
        let notifier = OutboxNotifier::new();
        let event = Notification::ReviewClaimed {
            content_id: ContentId::new(),
            claimant_id: UserId::new(),
            recipient_id: UserId::new(),
        };
        notifier.dispatch(event.clone()).await.unwrap();

        assert_eq!(notifier.drain(), vec![event]);
        assert!(notifier.drain().is_empty());
    }
}
