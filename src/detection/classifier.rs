use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Input handed to a classifier for one analysis.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub image: Arc<[u8]>,
    pub mime_type: &'static str,
    /// Cyclic position the session would show next.
    pub cursor: usize,
    pub catalog_len: usize,
}

/// Resolves an image to a diagnosis catalog index.
///
/// The controller runs at most one call per session and may drop the future
/// at any await point when the image is replaced.
pub trait Classifier: Send + Sync + 'static {
    fn classify(&self, request: ClassifyRequest) -> impl Future<Output = Result<usize>> + Send;
}

/// Fixed-latency stand-in that walks the catalog in order.
#[derive(Debug, Clone)]
pub struct DeterministicStub {
    delay: Duration,
}

impl DeterministicStub {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(2000);

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl Default for DeterministicStub {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

impl Classifier for DeterministicStub {
    fn classify(&self, request: ClassifyRequest) -> impl Future<Output = Result<usize>> + Send {
        let delay = self.delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(request.cursor)
        }
    }
}

/// Picks a uniformly random diagnosis after a fixed delay.
pub struct RandomStub {
    delay: Duration,
    rng: Mutex<StdRng>,
}

impl RandomStub {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(delay: Duration, seed: u64) -> Self {
        Self {
            delay,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Classifier for RandomStub {
    fn classify(&self, request: ClassifyRequest) -> impl Future<Output = Result<usize>> + Send {
        let picked = if request.catalog_len == 0 {
            None
        } else {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            Some(rng.gen_range(0..request.catalog_len))
        };
        let delay = self.delay;
        async move {
            let Some(index) = picked else {
                bail!("diagnosis catalog is empty");
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(index)
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemotePrediction {
    index: usize,
}

/// Posts the raw image to an inference endpoint that answers `{"index": n}`.
#[derive(Debug, Clone)]
pub struct RemoteModel {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteModel {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Classifier for RemoteModel {
    fn classify(&self, request: ClassifyRequest) -> impl Future<Output = Result<usize>> + Send {
        let call = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, request.mime_type)
            .body(request.image.to_vec());
        let endpoint = self.endpoint.clone();
        async move {
            let prediction: RemotePrediction = call
                .send()
                .await
                .with_context(|| format!("request to {endpoint} failed"))?
                .error_for_status()
                .with_context(|| format!("{endpoint} rejected the image"))?
                .json()
                .await
                .context("unreadable prediction payload")?;
            Ok(prediction.index)
        }
    }
}

/// Which classifier a deployment uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClassifierKind {
    #[default]
    Deterministic,
    Random,
    Remote {
        endpoint: String,
    },
}

/// Classifier chosen at runtime from settings.
pub enum AnyClassifier {
    Deterministic(DeterministicStub),
    Random(RandomStub),
    Remote(RemoteModel),
}

impl AnyClassifier {
    pub fn from_kind(kind: &ClassifierKind, delay: Duration) -> Self {
        match kind {
            ClassifierKind::Deterministic => Self::Deterministic(DeterministicStub::new(delay)),
            ClassifierKind::Random => Self::Random(RandomStub::new(delay)),
            ClassifierKind::Remote { endpoint } => Self::Remote(RemoteModel::new(endpoint.clone())),
        }
    }
}

impl Classifier for AnyClassifier {
    fn classify(&self, request: ClassifyRequest) -> impl Future<Output = Result<usize>> + Send {
        async move {
            match self {
                Self::Deterministic(inner) => inner.classify(request).await,
                Self::Random(inner) => inner.classify(request).await,
                Self::Remote(inner) => inner.classify(request).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(cursor: usize) -> ClassifyRequest {
        ClassifyRequest {
            image: Arc::from(vec![0u8; 4]),
            mime_type: "image/png",
            cursor,
            catalog_len: 3,
        }
    }

    #[tokio::test]
    async fn deterministic_stub_echoes_cursor() {
        let stub = DeterministicStub::instant();
        for cursor in 0..3 {
            assert_eq!(stub.classify(request(cursor)).await.unwrap(), cursor);
        }
    }

    #[tokio::test]
    async fn seeded_random_stub_is_reproducible_and_in_range() {
        let a = RandomStub::seeded(Duration::ZERO, 42);
        let b = RandomStub::seeded(Duration::ZERO, 42);
        for _ in 0..20 {
            let left = a.classify(request(0)).await.unwrap();
            let right = b.classify(request(0)).await.unwrap();
            assert_eq!(left, right);
            assert!(left < 3);
        }
    }

    #[tokio::test]
    async fn random_stub_rejects_empty_catalog() {
        let stub = RandomStub::seeded(Duration::ZERO, 1);
        let mut empty = request(0);
        empty.catalog_len = 0;
        assert!(stub.classify(empty).await.is_err());
    }

    #[tokio::test]
    async fn remote_model_reports_unreachable_endpoint() {
        let model = RemoteModel::new("http://127.0.0.1:9/classify");
        let err = model.classify(request(0)).await.unwrap_err();
        assert!(format!("{err:#}").contains("127.0.0.1:9"));
    }

    #[test]
    fn kind_builds_matching_variant() {
        let remote = ClassifierKind::Remote {
            endpoint: "http://models.local/leaf".into(),
        };
        match AnyClassifier::from_kind(&remote, Duration::ZERO) {
            AnyClassifier::Remote(model) => assert_eq!(model.endpoint(), "http://models.local/leaf"),
            _ => panic!("expected remote classifier"),
        }
        assert!(matches!(
            AnyClassifier::from_kind(&ClassifierKind::default(), Duration::ZERO),
            AnyClassifier::Deterministic(_)
        ));
    }
}
