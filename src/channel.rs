//! Typed message channels between the observer and relay tasks.
//!
//! Each side is addressed through a cheap, cloneable handle. Delivery is
//! at-most-once with no retries; correlation is by post id.

use tokio::sync::{mpsc, oneshot};

use crate::error::{ObserverError, RelayError};
use crate::models::PostId;
use crate::protocol::{ClassificationRequest, Message};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Page activity that should trigger a rescan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    Scroll,
    Mutation,
}

#[derive(Debug)]
pub enum ObserverEvent {
    Page(PageEvent),
    Message(Message),
    /// The relay never acknowledged a dispatched request.
    DispatchFailed(PostId),
}

/// Acknowledgement sent back for a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Relay: request accepted, classification in progress.
    Received,
    /// Observer: decision stored.
    Stored,
    /// Observer: error result handled, post eligible for retry.
    ErrorAcknowledged,
}

impl Ack {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ack::Received => "received, classifying",
            Ack::Stored => "stored",
            Ack::ErrorAcknowledged => "error acknowledged",
        }
    }
}

/// Sending side of an observer's event queue.
#[derive(Debug, Clone)]
pub struct ObserverMailbox {
    tx: mpsc::UnboundedSender<ObserverEvent>,
}

impl ObserverMailbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ObserverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn notify(&self, event: PageEvent) -> Result<(), ObserverError> {
        self.send(ObserverEvent::Page(event))
    }

    pub fn deliver(&self, message: Message) -> Result<(), ObserverError> {
        self.send(ObserverEvent::Message(message))
    }

    pub(crate) fn dispatch_failed(&self, post_id: PostId) -> Result<(), ObserverError> {
        self.send(ObserverEvent::DispatchFailed(post_id))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: ObserverEvent) -> Result<(), ObserverError> {
        self.tx.send(event).map_err(|_| ObserverError::Closed)
    }
}

/// A request in flight to the relay, with its acknowledgement slot and the
/// mailbox the result goes back to.
#[derive(Debug)]
pub struct RelayEnvelope {
    pub message: Message,
    pub ack: oneshot::Sender<Ack>,
    pub reply_to: ObserverMailbox,
}

#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<RelayEnvelope>,
}

impl RelayHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RelayEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(
        &self,
        message: Message,
        reply_to: ObserverMailbox,
    ) -> Result<oneshot::Receiver<Ack>, RelayError> {
        let (ack, ack_rx) = oneshot::channel();
        self.tx
            .send(RelayEnvelope {
                message,
                ack,
                reply_to,
            })
            .map_err(|_| RelayError::Closed)?;
        Ok(ack_rx)
    }
}

/// Outbound port the tracker uses to request classification.
pub trait Dispatch {
    fn dispatch(&self, request: ClassificationRequest) -> Result<(), ObserverError>;
}

/// [`Dispatch`] over a [`RelayHandle`]. A closed relay fails synchronously; a
/// dropped acknowledgement is reported back to the observer as
/// [`ObserverEvent::DispatchFailed`] so the post can be rolled back.
#[derive(Debug, Clone)]
pub struct RelayPort {
    relay: RelayHandle,
    mailbox: ObserverMailbox,
}

impl RelayPort {
    pub fn new(relay: RelayHandle, mailbox: ObserverMailbox) -> Self {
        Self { relay, mailbox }
    }
}

impl Dispatch for RelayPort {
    fn dispatch(&self, request: ClassificationRequest) -> Result<(), ObserverError> {
        let post_id = request.post_id.clone();
        let ack_rx = self
            .relay
            .send(Message::Classify(request), self.mailbox.clone())
            .map_err(|_| ObserverError::DispatchFailure(post_id.clone()))?;

        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            match ack_rx.await {
                Ok(ack) => log_debug!("relay ack for post {}: {}", post_id, ack.as_str()),
                Err(_) => {
                    log_warn!("relay dropped request for post {} without acknowledging", post_id);
                    let _ = mailbox.dispatch_failed(post_id);
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_relay_fails_dispatch_synchronously() {
        let (relay, relay_rx) = RelayHandle::channel();
        let (mailbox, _events) = ObserverMailbox::channel();
        drop(relay_rx);

        let port = RelayPort::new(relay, mailbox);
        let err = port
            .dispatch(ClassificationRequest::new(PostId::new("9"), "text"))
            .unwrap_err();
        assert!(matches!(err, ObserverError::DispatchFailure(id) if id.as_str() == "9"));
    }

    #[tokio::test]
    async fn dropped_ack_reports_dispatch_failure() {
        let (relay, mut relay_rx) = RelayHandle::channel();
        let (mailbox, mut events) = ObserverMailbox::channel();

        let port = RelayPort::new(relay, mailbox);
        port.dispatch(ClassificationRequest::new(PostId::new("9"), "text"))
            .unwrap();

        let envelope = relay_rx.recv().await.unwrap();
        drop(envelope);

        match events.recv().await.unwrap() {
            ObserverEvent::DispatchFailed(id) => assert_eq!(id.as_str(), "9"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn mailbox_reports_closed_observer() {
        let (mailbox, events) = ObserverMailbox::channel();
        drop(events);
        assert!(mailbox.is_closed());
        assert!(matches!(
            mailbox.notify(PageEvent::Scroll),
            Err(ObserverError::Closed)
        ));
    }
}
