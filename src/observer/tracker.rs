use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::channel::{Ack, Dispatch};
use crate::error::ObserverError;
use crate::models::{Decision, PostId, TrackedState, Verdict};
use crate::page::{extract_post_id, find_post, marker, Page};
use crate::protocol::{ClassificationRequest, Outcome, ResultMessage};
use crate::utils::preview;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Counters describing the tracker, published after every handled event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverSnapshot {
    pub scans: u64,
    pub requests_sent: u64,
    pub pending: usize,
    pub decided: usize,
    pub highlighted: usize,
}

/// What one scan did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub requested: Vec<PostId>,
    pub reapplied: usize,
    pub skipped: usize,
    pub dispatch_failures: usize,
}

/// Decision store and marker bindings for one page.
///
/// A post id is absent (unseen), `Pending`, or `Decided`. Bindings remember
/// which element currently carries the marker for a post.
pub struct Tracker<E> {
    states: HashMap<PostId, TrackedState>,
    bindings: HashMap<PostId, E>,
    scans: u64,
    requests_sent: u64,
}

impl<E> Default for Tracker<E> {
    fn default() -> Self {
        Self {
            states: HashMap::new(),
            bindings: HashMap::new(),
            scans: 0,
            requests_sent: 0,
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for Tracker<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("states", &self.states)
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl<E: Clone + PartialEq + fmt::Debug> Tracker<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, post_id: &PostId) -> Option<&TrackedState> {
        self.states.get(post_id)
    }

    pub fn binding(&self, post_id: &PostId) -> Option<&E> {
        self.bindings.get(post_id)
    }

    pub fn snapshot(&self) -> ObserverSnapshot {
        let pending = self.states.values().filter(|s| s.is_pending()).count();
        ObserverSnapshot {
            scans: self.scans,
            requests_sent: self.requests_sent,
            pending,
            decided: self.states.len() - pending,
            highlighted: self.bindings.len(),
        }
    }

    /// Walks the visible posts: re-marks decided ones, leaves pending ones
    /// alone, and requests classification for unseen ones that have text.
    pub fn scan<P, D>(&mut self, page: &mut P, relay: &D) -> ScanReport
    where
        P: Page<Element = E>,
        D: Dispatch,
    {
        self.scans += 1;
        let mut report = ScanReport::default();

        for element in page.visible_posts() {
            let Some(post_id) = extract_post_id(&page.anchors(&element)) else {
                report.skipped += 1;
                continue;
            };

            let tracked = self
                .states
                .get(&post_id)
                .map(|state| state.decision().map(|decision| decision.verdict));

            match tracked {
                Some(Some(verdict)) => {
                    if verdict.is_highlight() {
                        self.apply_highlight(page, &element, &post_id);
                    } else {
                        self.remove_highlight(page, &post_id);
                    }
                    report.reapplied += 1;
                }
                // Pending: already awaiting a result.
                Some(None) => {}
                None => {
                    let Some(text) = page.post_text(&element) else {
                        report.skipped += 1;
                        continue;
                    };

                    self.states.insert(post_id.clone(), TrackedState::Pending);
                    let request = ClassificationRequest::new(post_id.clone(), text);
                    match relay.dispatch(request) {
                        Ok(()) => {
                            self.requests_sent += 1;
                            report.requested.push(post_id);
                        }
                        Err(err) => {
                            log_warn!("{err}; will retry on next scan");
                            self.states.remove(&post_id);
                            report.dispatch_failures += 1;
                        }
                    }
                }
            }
        }

        log_debug!(
            "scan #{}: {} requested, {} re-marked, {} skipped",
            self.scans,
            report.requested.len(),
            report.reapplied,
            report.skipped
        );
        report
    }

    /// Reconciles one classification result with the store and the page.
    pub fn on_result<P>(&mut self, page: &mut P, result: ResultMessage) -> Result<Ack, ObserverError>
    where
        P: Page<Element = E>,
    {
        let (post_id, outcome) = match result.into_outcome() {
            Ok(parts) => parts,
            Err(err) => {
                log_error!("rejected classification result: {err}");
                return Err(err);
            }
        };

        match outcome {
            Outcome::Failed(error) => {
                log_error!("classification failed for post {post_id}: {error}");
                match self.states.get(&post_id) {
                    Some(TrackedState::Pending) => {
                        self.states.remove(&post_id);
                        self.remove_highlight(page, &post_id);
                    }
                    Some(TrackedState::Decided(_)) => {
                        log_warn!("error for already decided post {post_id}; keeping decision");
                        self.remove_highlight(page, &post_id);
                    }
                    None => {
                        log_warn!("error for untracked post {post_id}");
                        self.remove_highlight(page, &post_id);
                    }
                }
                Ok(Ack::ErrorAcknowledged)
            }
            Outcome::Decided(decision) => {
                log_info!(
                    "decision {} for post {} (text: {})",
                    decision.verdict.as_str(),
                    post_id,
                    preview(&decision.original_text, 50)
                );
                let verdict = decision.verdict;
                self.states.insert(post_id.clone(), TrackedState::Decided(decision));

                match self.locate(page, &post_id) {
                    Some(element) if verdict == Verdict::Highlight => {
                        self.apply_highlight(page, &element, &post_id);
                    }
                    // Not on the page right now: the decision is kept and
                    // applied when a scan sees the post again.
                    _ => self.remove_highlight(page, &post_id),
                }
                Ok(Ack::Stored)
            }
        }
    }

    /// Returns a pending post to unseen after its request was lost.
    pub fn rollback(&mut self, post_id: &PostId) -> bool {
        if self.states.get(post_id).is_some_and(TrackedState::is_pending) {
            self.states.remove(post_id);
            true
        } else {
            false
        }
    }

    /// Removes every tracked marker and forgets all state.
    pub fn teardown<P>(&mut self, page: &mut P)
    where
        P: Page<Element = E>,
    {
        for (_, element) in self.bindings.drain() {
            if page.contains(&element) {
                marker::clear(page, &element);
            }
        }
        self.states.clear();
    }

    pub fn decision(&self, post_id: &PostId) -> Option<&Decision> {
        self.states.get(post_id).and_then(TrackedState::decision)
    }

    fn locate<P>(&mut self, page: &P, post_id: &PostId) -> Option<E>
    where
        P: Page<Element = E>,
    {
        if let Some(element) = self.bindings.get(post_id) {
            if page.contains(element) {
                return Some(element.clone());
            }
            self.bindings.remove(post_id);
        }
        find_post(page, post_id)
    }

    fn apply_highlight<P>(&mut self, page: &mut P, element: &E, post_id: &PostId)
    where
        P: Page<Element = E>,
    {
        marker::apply(page, element);
        if self.bindings.get(post_id) != Some(element) {
            self.bindings.insert(post_id.clone(), element.clone());
        }
    }

    fn remove_highlight<P>(&mut self, page: &mut P, post_id: &PostId)
    where
        P: Page<Element = E>,
    {
        if let Some(element) = self.bindings.remove(post_id) {
            if page.contains(&element) {
                marker::clear(page, &element);
            }
        }
        // The post may have been re-rendered since it was bound.
        if let Some(element) = find_post(page, post_id) {
            marker::clear(page, &element);
        }
    }
}
