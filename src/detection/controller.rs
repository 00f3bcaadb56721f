use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::{catalog::DiagnosisCatalog, error::DetectionError};

use super::{
    classifier::{Classifier, ClassifyRequest},
    AnalysisTicket, Completion, DetectionSession, DetectionSnapshot, ImageHandle,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(10);

struct AnalysisTask {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Owns one detection session and runs its classifier in the background.
pub struct DetectionController<C> {
    state: Arc<Mutex<DetectionSession>>,
    classifier: Arc<C>,
    catalog: DiagnosisCatalog,
    analysis: Arc<Mutex<Option<AnalysisTask>>>,
    timeout: Duration,
    events: Arc<watch::Sender<DetectionSnapshot>>,
}

impl<C> Clone for DetectionController<C> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            classifier: self.classifier.clone(),
            catalog: self.catalog,
            analysis: self.analysis.clone(),
            timeout: self.timeout,
            events: self.events.clone(),
        }
    }
}

impl<C: Classifier> DetectionController<C> {
    pub fn new(classifier: C, catalog: DiagnosisCatalog) -> Self {
        let (events, _) = watch::channel(DetectionSnapshot::default());
        Self {
            state: Arc::new(Mutex::new(DetectionSession::new())),
            classifier: Arc::new(classifier),
            catalog,
            analysis: Arc::new(Mutex::new(None)),
            timeout: DEFAULT_ANALYSIS_TIMEOUT,
            events: Arc::new(events),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &DiagnosisCatalog {
        &self.catalog
    }

    /// Receives a fresh snapshot after every transition.
    pub fn subscribe(&self) -> watch::Receiver<DetectionSnapshot> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> DetectionSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn select_image(&self, image: ImageHandle) -> DetectionSnapshot {
        self.cancel_analysis().await;
        let (released, snapshot) = {
            let mut state = self.state.lock().await;
            let released = state.select_image(image);
            (released, self.publish(&state))
        };
        if let Some(old) = released {
            log_info!("Replaced image {} with {:?}", old.id(), snapshot.image_id);
        }
        snapshot
    }

    pub async fn clear_image(&self) -> DetectionSnapshot {
        self.cancel_analysis().await;
        let mut state = self.state.lock().await;
        drop(state.clear_image());
        self.publish(&state)
    }

    /// Moves the session to `Analyzing` and spawns the classifier call.
    ///
    /// Returns immediately; watch [`subscribe`](Self::subscribe) for the outcome.
    pub async fn start_analysis(&self) -> Result<DetectionSnapshot, DetectionError> {
        let mut state = self.state.lock().await;
        let ticket = match state.begin_analysis() {
            Ok(ticket) => ticket,
            Err(err) => {
                log_warn!("Ignoring analysis request: {}", err);
                return Err(err);
            }
        };
        let mime_type = state
            .image()
            .map(ImageHandle::mime_type)
            .unwrap_or("application/octet-stream");
        let snapshot = self.publish(&state);

        // The task needs the state lock to complete, so it cannot overtake the publish above.
        self.spawn_analysis(ticket, mime_type).await;
        Ok(snapshot)
    }

    /// Waits until the session leaves `Analyzing` and returns the settled snapshot.
    pub async fn wait_for_settled(&self) -> DetectionSnapshot {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|snapshot| snapshot.status != super::DetectionStatus::Analyzing)
            .await
            .map(|snapshot| snapshot.clone());
        match settled {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshot().await,
        }
    }

    async fn spawn_analysis(&self, ticket: AnalysisTicket, mime_type: &'static str) {
        let mut analysis_guard = self.analysis.lock().await;
        if let Some(stale) = analysis_guard.take() {
            stale.cancel_token.cancel();
            stale.handle.abort();
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();
        let state = self.state.clone();
        let classifier = self.classifier.clone();
        let events = self.events.clone();
        let catalog_len = self.catalog.len();
        let timeout = self.timeout;

        let handle = tokio::spawn(async move {
            let request = ClassifyRequest {
                image: ticket.image,
                mime_type,
                cursor: ticket.cursor,
                catalog_len,
            };

            let outcome = tokio::select! {
                _ = token_clone.cancelled() => {
                    log_info!("Analysis of image {} abandoned", ticket.image_id);
                    return;
                }
                result = time::timeout(timeout, classifier.classify(request)) => match result {
                    Ok(Ok(index)) => Ok(index),
                    Ok(Err(err)) => {
                        log_error!("Classifier failed for image {}: {err:#}", ticket.image_id);
                        Err(DetectionError::ClassifierFailure(format!("{err:#}")))
                    }
                    Err(_) => {
                        log_warn!("Classifier timeout (> {:?}) for image {}", timeout, ticket.image_id);
                        Err(DetectionError::ClassifierTimeout(timeout))
                    }
                },
            };

            let mut guard = state.lock().await;
            match guard.complete_analysis(ticket.generation, outcome, catalog_len, Utc::now()) {
                Completion::Applied => {
                    if let Some(index) = guard.diagnosis() {
                        log_info!("Image {} diagnosed as catalog entry {}", ticket.image_id, index);
                    }
                    events.send_replace(guard.snapshot());
                }
                Completion::Stale => {
                    log_info!("Dropping stale analysis result for image {}", ticket.image_id);
                }
            }
        });

        *analysis_guard = Some(AnalysisTask {
            handle,
            cancel_token,
        });
    }

    async fn cancel_analysis(&self) {
        if let Some(task) = self.analysis.lock().await.take() {
            task.cancel_token.cancel();
            task.handle.abort();
        }
    }

    /// Publishes while the caller still holds the state lock so observers see transitions in order.
    fn publish(&self, state: &DetectionSession) -> DetectionSnapshot {
        let snapshot = state.snapshot();
        self.events.send_replace(snapshot.clone());
        snapshot
    }
}
