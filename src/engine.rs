use crate::{
    assembler,
    config::Config,
    dom,
    error::{AppError, FeatureError},
    fetcher::ContentFetcher,
    lexical,
    model::Classifier,
    reputation::ReputationResolver,
    types::{ClassificationResult, DomFeatures, LexicalFeatures, ParsedUrl, UNDETERMINED},
};
use std::{panic, sync::Arc, time::Instant};
use tracing::{debug, info};
use uuid::Uuid;

pub struct DetectionEngine {
    fetcher: ContentFetcher,
    reputation: ReputationResolver,
    classifier: Arc<Classifier>,
}

impl DetectionEngine {
    pub fn new(config: Config, classifier: Arc<Classifier>) -> Result<Self, AppError> {
        info!("Initializing detection engine...");

        let fetcher = ContentFetcher::new(config.fetch)
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        // Search-index queries reuse the fetcher's connection pool.
        let reputation = ReputationResolver::new(
            config.whois,
            config.dns,
            config.search,
            fetcher.client().clone(),
        )
        .map_err(|e| AppError::Internal(format!("failed to build reputation resolver: {}", e)))?;

        info!(
            "Detection engine ready ({} model {})",
            classifier.kind(),
            classifier.version()
        );

        Ok(Self {
            fetcher,
            reputation,
            classifier,
        })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Runs the full pipeline for one URL. Sub-step failures degrade the
    /// affected fields; this never returns an error.
    pub async fn classify(&self, url: &str) -> ClassificationResult {
        let start = Instant::now();
        let decision_id = Uuid::new_v4();

        let hostname = ParsedUrl::parse(url).hostname;
        let lexical = analyze_lexical(url);

        let (dom, reputation) = tokio::join!(
            self.page_features(url, &hostname),
            self.reputation.resolve(url, &hostname),
        );

        let features = assembler::assemble(lexical, dom, reputation);
        let undetermined = features.iter().filter(|(_, v)| *v == UNDETERMINED).count();
        debug!(undetermined, "Assembled feature vector for {}", url);

        let label = self.classifier.predict(&features);

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::counter!("classifications_total", "label" => label.as_str()).increment(1);
        metrics::histogram!("classify_duration_ms").record(latency_ms);

        info!(%decision_id, "Classified {} as {} in {:.1}ms", url, label, latency_ms);

        ClassificationResult {
            decision_id,
            label,
            features,
            latency_ms,
        }
    }

    async fn page_features(&self, url: &str, hostname: &str) -> Result<DomFeatures, FeatureError> {
        let page = self.fetcher.fetch(url).await?;
        debug!("Fetched {} ({} bytes, status {})", url, page.body.len(), page.status);
        Ok(dom::extract(&page, hostname)?)
    }
}

/// Lexical analysis has no failure path of its own; a panic inside it is
/// turned into an error so only this URL's record degrades.
fn analyze_lexical(url: &str) -> Result<LexicalFeatures, FeatureError> {
    contain_panic(|| lexical::analyze(url))
}

fn contain_panic<F>(f: F) -> Result<LexicalFeatures, FeatureError>
where
    F: FnOnce() -> LexicalFeatures + panic::UnwindSafe,
{
    panic::catch_unwind(f).map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        FeatureError::Lexical(reason)
    })
}
