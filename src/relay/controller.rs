use anyhow::{bail, Context, Result};
use log::info;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::{Ack, ObserverMailbox, RelayEnvelope, RelayHandle};
use crate::models::PostId;
use crate::protocol::{Message, ResultMessage};

use super::classifier::Classifier;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Owns the relay task. Each accepted request gets exactly one classifier call;
/// there is no batching, deduplication or retry at this layer.
pub struct RelayController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for RelayController {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start<C>(&mut self, classifier: C) -> Result<RelayHandle>
    where
        C: Classifier + 'static,
    {
        if self.handle.is_some() {
            bail!("relay already active");
        }

        let cancel_token = CancellationToken::new();
        let (relay, requests) = RelayHandle::channel();
        let handle = tokio::spawn(relay_loop(
            Arc::new(classifier),
            requests,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(relay)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops accepting requests. Classifier calls already in flight still
    /// deliver their results if the observer is around to take them.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle.await.context("relay loop task failed to join")?;
            info!("relay stopped");
        }
        Ok(())
    }
}

async fn relay_loop(
    classifier: Arc<dyn Classifier>,
    mut requests: mpsc::UnboundedReceiver<RelayEnvelope>,
    cancel_token: CancellationToken,
) {
    log_info!("relay started");
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("relay shutting down");
                break;
            }
            envelope = requests.recv() => match envelope {
                Some(envelope) => handle_envelope(Arc::clone(&classifier), envelope),
                None => break,
            },
        }
    }
}

fn handle_envelope(classifier: Arc<dyn Classifier>, envelope: RelayEnvelope) {
    let RelayEnvelope {
        message,
        ack,
        reply_to,
    } = envelope;

    let request = match message {
        Message::Classify(request) if !request.post_id.is_empty() => request,
        other => {
            // Dropping the ack tells the sender the request went nowhere.
            log_warn!("relay ignoring '{}' message without a usable post id", other.action());
            return;
        }
    };

    if ack.send(Ack::Received).is_err() {
        log_warn!("observer stopped waiting for ack of post {}", request.post_id);
    }

    tokio::spawn(async move {
        let post_id = request.post_id;
        let result = match classifier.classify(&request.text).await {
            Ok(classification) => {
                log_info!(
                    "received decision {} for post {}",
                    u8::from(classification.verdict),
                    post_id
                );
                ResultMessage::success(
                    post_id.clone(),
                    classification.verdict,
                    classification.original_text,
                )
            }
            Err(err) => {
                log_error!("classification call failed for post {}: {err}", post_id);
                ResultMessage::failure(post_id.clone(), format!("Error processing post: {err}"))
            }
        };
        deliver(&reply_to, post_id, result);
    });
}

fn deliver(reply_to: &ObserverMailbox, post_id: PostId, result: ResultMessage) {
    if let Err(err) = reply_to.deliver(Message::ClassificationResult(result)) {
        log_warn!("could not send result for post {} back to observer: {err}", post_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ObserverEvent;
    use crate::error::RelayError;
    use crate::models::Verdict;
    use crate::protocol::{ClassificationRequest, Outcome};
    use crate::relay::Classification;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticClassifier {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Classifier for StaticClassifier {
        async fn classify(&self, text: &str) -> Result<Classification, RelayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RelayError::Status(500));
            }
            Ok(Classification {
                verdict: Verdict::Highlight,
                original_text: text.to_string(),
            })
        }
    }

    fn classify(id: &str, text: &str) -> Message {
        Message::Classify(ClassificationRequest::new(PostId::new(id), text))
    }

    async fn next_result(events: &mut mpsc::UnboundedReceiver<ObserverEvent>) -> ResultMessage {
        match events.recv().await {
            Some(ObserverEvent::Message(Message::ClassificationResult(result))) => result,
            other => panic!("expected a classification result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn acknowledges_then_forwards_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut controller = RelayController::new();
        let relay = controller
            .start(StaticClassifier {
                calls: calls.clone(),
                fail: false,
            })
            .unwrap();
        let (mailbox, mut events) = ObserverMailbox::channel();

        let ack = relay.send(classify("1001", "Buy now!!"), mailbox).unwrap();
        assert_eq!(ack.await.unwrap(), Ack::Received);

        let (post_id, outcome) = next_result(&mut events).await.into_outcome().unwrap();
        assert_eq!(post_id, PostId::new("1001"));
        match outcome {
            Outcome::Decided(decision) => {
                assert_eq!(decision.verdict, Verdict::Highlight);
                assert_eq!(decision.original_text, "Buy now!!");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn classifier_failure_is_forwarded_with_post_id() {
        let mut controller = RelayController::new();
        let relay = controller
            .start(StaticClassifier {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: true,
            })
            .unwrap();
        let (mailbox, mut events) = ObserverMailbox::channel();

        relay.send(classify("1002", "x"), mailbox).unwrap();

        let result = next_result(&mut events).await;
        assert_eq!(result.post_id, Some(PostId::new("1002")));
        assert!(result.error.unwrap().contains("HTTP 500"));

        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn every_request_gets_its_own_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut controller = RelayController::new();
        let relay = controller
            .start(StaticClassifier {
                calls: calls.clone(),
                fail: false,
            })
            .unwrap();
        let (mailbox, mut events) = ObserverMailbox::channel();

        for _ in 0..3 {
            relay.send(classify("5", "same text"), mailbox.clone()).unwrap();
        }
        for _ in 0..3 {
            next_result(&mut events).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn result_for_closed_observer_is_swallowed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut controller = RelayController::new();
        let relay = controller
            .start(StaticClassifier {
                calls: calls.clone(),
                fail: false,
            })
            .unwrap();
        let (mailbox, events) = ObserverMailbox::channel();
        drop(events);

        let ack = relay.send(classify("6", "bye"), mailbox).unwrap();
        assert_eq!(ack.await.unwrap(), Ack::Received);
        tokio::task::yield_now().await;

        // The relay keeps serving after a failed delivery.
        let (mailbox, mut events) = ObserverMailbox::channel();
        relay.send(classify("7", "hi"), mailbox).unwrap();
        next_result(&mut events).await;

        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn non_classify_message_is_not_acknowledged() {
        let mut controller = RelayController::new();
        let relay = controller
            .start(StaticClassifier {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
            })
            .unwrap();
        let (mailbox, _events) = ObserverMailbox::channel();

        let stray = Message::ClassificationResult(ResultMessage::failure(PostId::new("1"), "x"));
        let ack = relay.send(stray, mailbox).unwrap();
        assert!(ack.await.is_err());

        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stopped_relay_rejects_requests() {
        let mut controller = RelayController::new();
        let relay = controller
            .start(StaticClassifier {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
            })
            .unwrap();
        assert!(controller.is_running());
        controller.stop().await.unwrap();
        assert!(!controller.is_running());

        let (mailbox, _events) = ObserverMailbox::channel();
        assert!(relay.send(classify("1", "x"), mailbox).is_err());
    }
}
