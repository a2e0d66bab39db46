use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel::{ObserverMailbox, PageEvent, RelayHandle};
use crate::page::Page;

use super::loop_worker::{observer_loop, ObserverLoop};
use super::tracker::ObserverSnapshot;
use super::ObserverConfig;

/// Owns one observer task: its event mailbox, its published snapshot, and its
/// start/stop lifecycle. Independent controllers never share state.
pub struct ObserverController {
    instance_id: String,
    config: ObserverConfig,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    mailbox: Option<ObserverMailbox>,
    snapshot_rx: Option<watch::Receiver<ObserverSnapshot>>,
}

impl ObserverController {
    pub fn new(config: ObserverConfig) -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
            config,
            handle: None,
            cancel_token: None,
            mailbox: None,
            snapshot_rx: None,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawns the observer loop over `page`, sending requests through `relay`.
    /// The first scan runs after the configured startup delay.
    pub fn start<P>(&mut self, page: P, relay: RelayHandle) -> Result<ObserverMailbox>
    where
        P: Page + Send + 'static,
        P::Element: Send + 'static,
    {
        if self.handle.is_some() {
            bail!("observer already active");
        }

        let cancel_token = CancellationToken::new();
        let (mailbox, events) = ObserverMailbox::channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ObserverSnapshot::default());

        let handle = tokio::spawn(observer_loop(ObserverLoop {
            instance_id: self.instance_id.clone(),
            page,
            relay,
            mailbox: mailbox.clone(),
            events,
            config: self.config.clone(),
            snapshot_tx,
            cancel_token: cancel_token.clone(),
        }));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.mailbox = Some(mailbox.clone());
        self.snapshot_rx = Some(snapshot_rx);
        Ok(mailbox)
    }

    /// Reports page activity; the scan it triggers is debounced.
    pub fn notify(&self, event: PageEvent) -> Result<()> {
        let mailbox = self.mailbox.as_ref().context("observer is not running")?;
        mailbox.notify(event).context("observer mailbox closed")
    }

    /// Latest published counters. Still readable after `stop`.
    pub fn snapshot(&self) -> ObserverSnapshot {
        self.snapshot_rx
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> Option<watch::Receiver<ObserverSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Cancels the loop and waits for it to remove its markers and clear state.
    pub async fn stop(&mut self) -> Result<()> {
        self.mailbox = None;

        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("observer loop task failed to join")?;
            info!("observer {} stopped", self.instance_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    fn config() -> ObserverConfig {
        ObserverConfig {
            debounce: Duration::from_millis(100),
            startup_delay: Duration::from_millis(750),
        }
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let (relay, _relay_rx) = RelayHandle::channel();
        let mut controller = ObserverController::new(config());
        controller
            .start(crate::page::SharedDocument::default(), relay.clone())
            .unwrap();

        let err = controller
            .start(crate::page::SharedDocument::default(), relay)
            .unwrap_err();
        assert!(err.to_string().contains("already active"));

        controller.stop().await.unwrap();
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn notify_before_start_fails() {
        let controller = ObserverController::new(config());
        assert!(controller.notify(PageEvent::Scroll).is_err());
    }

    #[tokio::test]
    async fn instances_get_distinct_ids() {
        let a = ObserverController::new(config());
        let b = ObserverController::new(config());
        assert_ne!(a.instance_id(), b.instance_id());
    }
}
