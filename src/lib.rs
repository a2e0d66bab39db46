//! Flags social-media posts on a page.
//!
//! An [`ObserverController`] scans the posts visible on a [`Page`], asks a
//! [`RelayController`] to classify the text of each new one, and marks the
//! posts the classification service flags. The two sides run as separate
//! tasks and talk only through the typed channels in [`channel`].

pub mod channel;
pub mod error;
pub mod models;
pub mod observer;
pub mod page;
pub mod protocol;
pub mod relay;
pub mod settings;
pub mod utils;

pub use channel::{Ack, ObserverMailbox, PageEvent, RelayHandle};
pub use error::{ObserverError, RelayError};
pub use models::{Decision, PostId, TrackedState, Verdict};
pub use observer::{ObserverConfig, ObserverController, ObserverSnapshot};
pub use page::{Document, Page, SharedDocument};
pub use relay::{Classifier, HttpClassifier, RelayController};
pub use settings::{Settings, SettingsStore};

use anyhow::{Context, Result};
use log::{info, warn};
use std::path::PathBuf;
use tokio::time;

const DEFAULT_SETTINGS_FILE: &str = "postflag.json";

/// Outcome of classifying one page snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedPost {
    pub post_id: Option<PostId>,
    pub text: Option<String>,
    pub flagged: bool,
}

/// Entry point of the `postflag` binary: `postflag <snapshot.json> [settings.json]`.
pub async fn run(args: Vec<String>) -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    let level = if settings::debug_enabled() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let mut args = args.into_iter().skip(1);
    let snapshot_path = args
        .next()
        .map(PathBuf::from)
        .context("usage: postflag <snapshot.json> [settings.json]")?;
    let settings_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));

    let settings = SettingsStore::new(settings_path)?
        .settings()
        .with_env_overrides();
    let raw = std::fs::read_to_string(&snapshot_path)
        .with_context(|| format!("Failed to read page snapshot {}", snapshot_path.display()))?;
    let document = SharedDocument::new(Document::from_json(&raw)?);

    let classifier = HttpClassifier::from_settings(&settings)?;
    info!("postflag starting up, classifying via {}", classifier.endpoint());
    let posts = flag_document(document, classifier, &settings).await?;

    for post in &posts {
        let id = post
            .post_id
            .as_ref()
            .map(PostId::as_str)
            .unwrap_or("<no id>");
        let mark = if post.flagged { "FLAGGED" } else { "ok" };
        println!(
            "{mark:>8}  {id:<22} {}",
            post.text.as_deref().map(|t| utils::preview(t, 60)).unwrap_or_default()
        );
    }
    Ok(())
}

/// Runs one observer and one relay over `document` until every request has
/// been answered (or the request timeout passes), then tears both down and
/// reports which posts carried the marker.
pub async fn flag_document<C>(
    document: SharedDocument,
    classifier: C,
    settings: &Settings,
) -> Result<Vec<FlaggedPost>>
where
    C: Classifier + 'static,
{
    let mut relay = RelayController::new();
    let relay_handle = relay.start(classifier)?;

    let mut observer = ObserverController::new(ObserverConfig::from(settings));
    observer.start(document.clone(), relay_handle)?;
    let mut updates = observer
        .subscribe()
        .context("observer did not publish a snapshot channel")?;

    let budget = settings.startup_delay() + settings.debounce() + settings.request_timeout();
    let settled = time::timeout(budget, async {
        loop {
            {
                let snapshot = updates.borrow_and_update();
                if snapshot.scans > 0 && snapshot.pending == 0 {
                    return;
                }
            }
            if updates.changed().await.is_err() {
                return;
            }
        }
    })
    .await;
    if settled.is_err() {
        warn!("gave up waiting for classification results after {:?}", budget);
    }

    let flagged = collect_flags(&document);

    observer.stop().await?;
    relay.stop().await?;
    Ok(flagged)
}

fn collect_flags(document: &SharedDocument) -> Vec<FlaggedPost> {
    let doc = document.lock();
    doc.nodes()
        .map(|node| FlaggedPost {
            post_id: page::extract_post_id(&node.anchors),
            text: node.text.clone(),
            flagged: page::marker::is_marked(&node.style),
        })
        .collect()
}
