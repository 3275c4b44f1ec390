//! Resilient Generation Orchestrator: one recommendation call, many keys.
//!
//! Flow per request: rotator key → provider handle → one structured attempt.
//! Rate-limited attempts mark the key failed and move on to the next key;
//! every other failure is returned as-is on first occurrence. Attempts run
//! strictly one after another.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::llm_client::{classify_failure, FailureClass, StructuredGenerator};
use crate::models::campaign::{CampaignBrief, InfluencerProfile};
use crate::models::recommendation::RecommendationResult;
use crate::recommendation::error::RecommendError;
use crate::recommendation::extractor::coerce_recommendations;
use crate::recommendation::key_rotator::{mask_key, KeyPoolStatus, KeyRotator};
use crate::recommendation::prompts::{
    build_user_prompt, output_shape, system_prompt, NO_CANDIDATES_SUMMARY,
};

/// What the HTTP layer needs from a recommendation backend.
///
/// Carried in `AppState` as `Arc<dyn Recommender>`.
#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(
        &self,
        brief: &CampaignBrief,
        candidates: &[InfluencerProfile],
    ) -> Result<RecommendationResult, RecommendError>;

    fn key_status(&self) -> KeyPoolStatus;

    fn reactivate_keys(&self);
}

pub struct RecommendationEngine<G> {
    rotator: Arc<KeyRotator>,
    generator: G,
    model: String,
    max_attempts: Option<usize>,
}

impl<G: StructuredGenerator> RecommendationEngine<G> {
    /// Builds an engine that owns a fresh rotator over `keys`.
    pub fn new<I, S>(
        keys: I,
        model: impl Into<String>,
        generator: G,
    ) -> Result<Self, RecommendError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rotator = Arc::new(KeyRotator::new(keys)?);
        Ok(Self::with_rotator(rotator, model, generator))
    }

    /// Builds an engine over an existing, possibly shared, rotator.
    pub fn with_rotator(rotator: Arc<KeyRotator>, model: impl Into<String>, generator: G) -> Self {
        Self {
            rotator,
            generator,
            model: model.into(),
            max_attempts: None,
        }
    }

    /// Overrides the retry budget (defaults to the pool size).
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn rotator(&self) -> &Arc<KeyRotator> {
        &self.rotator
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ranks `candidates` against `brief`.
    ///
    /// An empty candidate list short-circuits: no key is taken and the
    /// provider is never touched.
    pub async fn generate_recommendations(
        &self,
        brief: &CampaignBrief,
        candidates: &[InfluencerProfile],
    ) -> Result<RecommendationResult, RecommendError> {
        if candidates.is_empty() {
            info!("No candidates supplied, skipping generation");
            return Ok(RecommendationResult::empty(NO_CANDIDATES_SUMMARY));
        }

        let system = system_prompt();
        let prompt = build_user_prompt(brief, candidates);
        let result = self.generate_with_rotation(&system, &prompt).await?;

        info!(
            "Generated {} recommendation(s) from {} candidate(s)",
            result.recommendations.len(),
            candidates.len()
        );
        Ok(result)
    }

    async fn generate_with_rotation(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<RecommendationResult, RecommendError> {
        let budget = self.max_attempts.unwrap_or_else(|| self.rotator.pool_size());
        let shape = output_shape();
        let mut last_failure: Option<FailureClass> = None;

        for attempt in 1..=budget {
            let key = self.rotator.get_next_key()?;
            let handle = self.generator.build_handle(&key, &self.model);

            let err = match self
                .generator
                .generate_structured(&handle, system, prompt, &shape)
                .await
            {
                Ok(payload) => return Ok(coerce_recommendations(payload)?),
                Err(err) => err,
            };

            match classify_failure(&err) {
                FailureClass::Other => return Err(RecommendError::Provider(err)),
                FailureClass::RateLimited => {
                    warn!(
                        "Attempt {}/{} rate limited on key {}: {}",
                        attempt,
                        budget,
                        mask_key(&key),
                        err
                    );
                    last_failure = Some(FailureClass::RateLimited);
                    self.rotator.mark_key_failed(&key);
                    if !self.rotator.has_available_keys() {
                        return Err(RecommendError::RateLimitExhausted { attempts: attempt });
                    }
                }
            }
        }

        match last_failure {
            Some(FailureClass::RateLimited) => {
                Err(RecommendError::RateLimitExhausted { attempts: budget })
            }
            _ => Err(RecommendError::GenerationFailed(format!(
                "no successful attempt within a budget of {budget}"
            ))),
        }
    }
}

#[async_trait]
impl<G> Recommender for RecommendationEngine<G>
where
    G: StructuredGenerator + 'static,
{
    async fn recommend(
        &self,
        brief: &CampaignBrief,
        candidates: &[InfluencerProfile],
    ) -> Result<RecommendationResult, RecommendError> {
        self.generate_recommendations(brief, candidates).await
    }

    fn key_status(&self) -> KeyPoolStatus {
        self.rotator.status()
    }

    fn reactivate_keys(&self) {
        self.rotator.reactivate_all();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::llm_client::{LlmError, StructuredGenerator};
    use crate::models::campaign::{CampaignBrief, InfluencerProfile};

    /// Replays scripted outcomes in order and records every credential used.
    #[derive(Default)]
    pub struct ScriptedGenerator {
        script: Mutex<VecDeque<Result<Value, LlmError>>>,
        handles_built: Mutex<Vec<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        pub fn new(script: Vec<Result<Value, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn handles_built(&self) -> usize {
            self.handles_built.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl StructuredGenerator for ScriptedGenerator {
        type Handle = String;

        fn build_handle(&self, credential: &str, _model: &str) -> String {
            self.handles_built.lock().unwrap().push(credential.to_string());
            credential.to_string()
        }

        async fn generate_structured(
            &self,
            handle: &String,
            _system_prompt: &str,
            _user_prompt: &str,
            _output_shape: &Value,
        ) -> Result<Value, LlmError> {
            self.calls.lock().unwrap().push(handle.clone());
            tokio::task::yield_now().await;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(rate_limited()))
        }
    }

    pub fn rate_limited() -> LlmError {
        LlmError::Api {
            status: 429,
            message: "Resource has been exhausted (e.g. check quota).".to_string(),
        }
    }

    pub fn valid_payload() -> Value {
        json!({
            "recommendations": [
                {
                    "influencerId": "inf-1",
                    "matchScore": 93,
                    "reasons": ["Fitness niche", "Austin audience"],
                    "contentStrategy": "Launch-week workout reels"
                }
            ],
            "summary": "Jess is the standout fit."
        })
    }

    pub fn brief() -> CampaignBrief {
        CampaignBrief {
            niche: "fitness".to_string(),
            company_size: "startup".to_string(),
            budget: 10000.0,
            target_audience: "women 25-34".to_string(),
            location: "Austin, TX".to_string(),
            campaign_type: "product launch".to_string(),
        }
    }

    pub fn candidates() -> Vec<InfluencerProfile> {
        vec![InfluencerProfile {
            id: "inf-1".to_string(),
            name: "Jess Moves".to_string(),
            niche: "fitness".to_string(),
            location: "Austin, TX".to_string(),
            followers_count: 48_200,
            engagement_rate: 5.1,
            price_per_post: 750.0,
            content_categories: vec!["workouts".to_string()],
            languages: vec!["English".to_string()],
            is_available: true,
        }]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::test_support::*;
    use super::*;
    use crate::llm_client::LlmError;
    use crate::recommendation::extractor::ExtractionError;

    fn engine(
        keys: &[&str],
        script: Vec<Result<serde_json::Value, LlmError>>,
    ) -> RecommendationEngine<ScriptedGenerator> {
        RecommendationEngine::new(
            keys.iter().copied(),
            "test-model",
            ScriptedGenerator::new(script),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_pool_is_configuration_error() {
        let result = RecommendationEngine::new(
            Vec::<String>::new(),
            "test-model",
            ScriptedGenerator::default(),
        );
        assert!(matches!(result, Err(RecommendError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_empty_candidates_short_circuit() {
        let engine = engine(&["key-1"], vec![Ok(valid_payload())]);
        let result = engine.generate_recommendations(&brief(), &[]).await.unwrap();

        assert!(result.recommendations.is_empty());
        assert_eq!(result.summary, NO_CANDIDATES_SUMMARY);
        assert_eq!(engine.generator.handles_built(), 0);
        assert!(engine.generator.calls().is_empty());
        assert_eq!(engine.rotator().active_key_count(), 1);
    }

    #[tokio::test]
    async fn test_success_on_first_key() {
        let engine = engine(&["key-1", "key-2"], vec![Ok(valid_payload())]);
        let result = engine
            .generate_recommendations(&brief(), &candidates())
            .await
            .unwrap();

        assert_eq!(result.recommendations.len(), 1);
        assert_eq!(result.recommendations[0].match_score, 93);
        assert_eq!(engine.generator.calls(), vec!["key-1"]);
    }

    #[tokio::test]
    async fn test_rate_limit_rotates_to_next_key() {
        let engine = engine(
            &["key-1", "key-2"],
            vec![Err(rate_limited()), Ok(valid_payload())],
        );
        let result = engine
            .generate_recommendations(&brief(), &candidates())
            .await
            .unwrap();

        assert_eq!(result.summary, "Jess is the standout fit.");
        assert_eq!(engine.generator.calls(), vec!["key-1", "key-2"]);
        assert_eq!(engine.rotator().active_key_count(), 1);
    }

    #[tokio::test]
    async fn test_message_based_rate_limit_rotates() {
        let engine = engine(
            &["key-1", "key-2"],
            vec![
                Err(LlmError::Api {
                    status: 400,
                    message: "Too Many Requests for this project".to_string(),
                }),
                Ok(valid_payload()),
            ],
        );
        assert!(engine
            .generate_recommendations(&brief(), &candidates())
            .await
            .is_ok());
        assert_eq!(engine.generator.calls(), vec!["key-1", "key-2"]);
    }

    #[tokio::test]
    async fn test_single_key_rate_limited_is_exhausted() {
        let engine = engine(&["key-1"], vec![Err(rate_limited())]);
        let err = engine
            .generate_recommendations(&brief(), &candidates())
            .await
            .unwrap_err();

        assert!(matches!(err, RecommendError::RateLimitExhausted { attempts: 1 }));
        assert_eq!(engine.generator.calls(), vec!["key-1"]);
    }

    #[tokio::test]
    async fn test_every_key_rate_limited_aborts_at_pool_exhaustion() {
        let engine = engine(
            &["key-1", "key-2", "key-3"],
            vec![Err(rate_limited()), Err(rate_limited()), Err(rate_limited())],
        );
        let err = engine
            .generate_recommendations(&brief(), &candidates())
            .await
            .unwrap_err();

        assert!(matches!(err, RecommendError::RateLimitExhausted { attempts: 3 }));
        assert_eq!(engine.generator.calls(), vec!["key-1", "key-2", "key-3"]);
        assert!(!engine.rotator().has_available_keys());
    }

    #[tokio::test]
    async fn test_budget_override_stops_before_pool_exhaustion() {
        let engine = engine(
            &["key-1", "key-2", "key-3"],
            vec![Err(rate_limited()), Err(rate_limited()), Ok(valid_payload())],
        )
        .with_max_attempts(2);
        let err = engine
            .generate_recommendations(&brief(), &candidates())
            .await
            .unwrap_err();

        assert!(matches!(err, RecommendError::RateLimitExhausted { attempts: 2 }));
        assert_eq!(engine.generator.calls().len(), 2);
        assert!(engine.rotator().has_available_keys());
    }

    #[tokio::test]
    async fn test_zero_budget_is_generation_failed() {
        let engine = engine(&["key-1"], vec![Ok(valid_payload())]).with_max_attempts(0);
        let err = engine
            .generate_recommendations(&brief(), &candidates())
            .await
            .unwrap_err();

        assert!(matches!(err, RecommendError::GenerationFailed(_)));
        assert!(engine.generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_other_failure_propagates_without_retry() {
        let engine = engine(
            &["key-1", "key-2"],
            vec![
                Err(LlmError::Api {
                    status: 401,
                    message: "API key not valid".to_string(),
                }),
                Ok(valid_payload()),
            ],
        );
        let err = engine
            .generate_recommendations(&brief(), &candidates())
            .await
            .unwrap_err();

        match err {
            RecommendError::Provider(LlmError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(engine.generator.calls(), vec!["key-1"]);
        assert_eq!(engine.rotator().active_key_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_payload_shape_is_extraction_error() {
        let engine = engine(&["key-1"], vec![Ok(json!({ "recommendations": [] }))]);
        let err = engine
            .generate_recommendations(&brief(), &candidates())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RecommendError::Extraction(ExtractionError::InvalidResponseShape(_))
        ));
    }

    #[tokio::test]
    async fn test_scores_are_clamped() {
        let engine = engine(
            &["key-1"],
            vec![Ok(json!({
                "recommendations": [
                    {"influencerId": "inf-1", "matchScore": 250, "reasons": ["x"], "contentStrategy": "y"}
                ],
                "summary": "s"
            }))],
        );
        let result = engine
            .generate_recommendations(&brief(), &candidates())
            .await
            .unwrap();
        assert_eq!(result.recommendations[0].match_score, 100);
    }

    #[tokio::test]
    async fn test_shared_rotator_continues_across_calls() {
        let rotator = Arc::new(KeyRotator::new(vec!["key-1", "key-2"]).unwrap());
        let engine = RecommendationEngine::with_rotator(
            Arc::clone(&rotator),
            "test-model",
            ScriptedGenerator::new(vec![Ok(valid_payload()), Ok(valid_payload())]),
        );

        engine
            .generate_recommendations(&brief(), &candidates())
            .await
            .unwrap();
        engine
            .generate_recommendations(&brief(), &candidates())
            .await
            .unwrap();

        assert_eq!(engine.generator.calls(), vec!["key-1", "key-2"]);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_sweep() {
        let rotator = Arc::new(KeyRotator::new(vec!["key-1", "key-2", "key-3"]).unwrap());
        let engine = RecommendationEngine::with_rotator(
            Arc::clone(&rotator),
            "test-model",
            ScriptedGenerator::new(vec![
                Err(rate_limited()),
                Ok(valid_payload()),
                Ok(valid_payload()),
            ]),
        );

        let (brief_a, candidates_a) = (brief(), candidates());
        let (brief_b, candidates_b) = (brief(), candidates());
        let (first, second) = tokio::join!(
            engine.generate_recommendations(&brief_a, &candidates_a),
            engine.generate_recommendations(&brief_b, &candidates_b),
        );
        first.unwrap();
        second.unwrap();

        let mut calls = engine.generator.calls();
        assert_eq!(calls.len(), 3);
        calls.sort();
        calls.dedup();
        assert_eq!(calls.len(), 3, "a key was handed out twice in one sweep");
        assert_eq!(rotator.active_key_count(), 2);
    }

    #[tokio::test]
    async fn test_recommender_trait_exposes_key_status() {
        let engine = engine(
            &["key-1", "key-2"],
            vec![Err(rate_limited()), Ok(valid_payload())],
        );
        let recommender: &dyn Recommender = &engine;

        recommender.recommend(&brief(), &candidates()).await.unwrap();
        assert_eq!(recommender.key_status().active_keys, 1);

        recommender.reactivate_keys();
        assert_eq!(recommender.key_status().active_keys, 2);
    }
}
