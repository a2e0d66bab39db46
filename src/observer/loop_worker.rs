use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::channel::{ObserverEvent, ObserverMailbox, PageEvent, RelayHandle, RelayPort};
use crate::page::Page;
use crate::protocol::Message;

use super::debounce::Debouncer;
use super::tracker::{ObserverSnapshot, Tracker};
use super::ObserverConfig;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_debug, log_info, log_warn};

pub(crate) struct ObserverLoop<P> {
    pub instance_id: String,
    pub page: P,
    pub relay: RelayHandle,
    pub mailbox: ObserverMailbox,
    pub events: mpsc::UnboundedReceiver<ObserverEvent>,
    pub config: ObserverConfig,
    pub snapshot_tx: watch::Sender<ObserverSnapshot>,
    pub cancel_token: CancellationToken,
}

/// Runs one observer until cancelled. Events are handled one at a time; scans
/// only ever run when the debounce deadline expires.
pub(crate) async fn observer_loop<P>(worker: ObserverLoop<P>)
where
    P: Page + Send + 'static,
    P::Element: Send + 'static,
{
    let ObserverLoop {
        instance_id,
        mut page,
        relay,
        mailbox,
        mut events,
        config,
        snapshot_tx,
        cancel_token,
    } = worker;

    let port = RelayPort::new(relay, mailbox);
    let mut tracker: Tracker<P::Element> = Tracker::new();
    let mut debouncer = Debouncer::new(config.debounce);
    debouncer.schedule_after(Instant::now(), config.startup_delay);

    log_info!("observer {} started (debounce {:?})", instance_id, config.debounce);

    loop {
        let deadline = debouncer.deadline();
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("observer {} shutting down", instance_id);
                break;
            }
            _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if debouncer.fire(Instant::now()) {
                    tracker.scan(&mut page, &port);
                }
            }
            event = events.recv() => match event {
                Some(ObserverEvent::Page(PageEvent::Scroll | PageEvent::Mutation)) => {
                    debouncer.schedule(Instant::now());
                }
                Some(ObserverEvent::Message(Message::ClassificationResult(result))) => {
                    match tracker.on_result(&mut page, result) {
                        Ok(ack) => log_debug!("observer {} result handled: {}", instance_id, ack.as_str()),
                        Err(err) => log_warn!("observer {} ignored result: {err}", instance_id),
                    }
                }
                Some(ObserverEvent::Message(other)) => {
                    log_warn!("observer {} ignoring unexpected '{}' message", instance_id, other.action());
                }
                Some(ObserverEvent::DispatchFailed(post_id)) => {
                    if tracker.rollback(&post_id) {
                        log_warn!("request for post {} was lost; will retry on next scan", post_id);
                    }
                }
                None => break,
            },
        }
        snapshot_tx.send_replace(tracker.snapshot());
    }

    debouncer.cancel();
    tracker.teardown(&mut page);
    snapshot_tx.send_replace(tracker.snapshot());
}
