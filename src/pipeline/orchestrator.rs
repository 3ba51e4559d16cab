//! [`Route2Orchestrator`]: threads a request through every pipeline stage —
//! Gate2 → fire base-filters/post-constraints concurrently → Intent →
//! near-me guard → Route-LLM mapper → filters resolve (join base filters) →
//! Google-Maps stage → Post-filter (join post-constraints) → response build.
//!
//! Resolves a config snapshot once, threads it through the call, instruments
//! with `#[tracing::instrument]` and fills in a span field mid-function via
//! `tracing::Span::current().record(...)`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{warn, Span};

use crate::config::Config;
use crate::health::HealthTracker;
use crate::llm::{LlmClient, LlmError};
use crate::model::{FailureReason, Language, RequestFilters, ResponseMeta, SearchResponse};
use crate::pipeline::errors::{classify_llm_error, PipelineErrorKind};
use crate::pipeline::gate2::GateAction;
use crate::pipeline::intent::{IntentReason, IntentRoute};
use crate::pipeline::post_constraints::PostConstraints;
use crate::pipeline::route_mapper::RouteMapperOutcome;
use crate::pipeline::{filters, gate2, google_maps, intent, nearme, post_constraints, route_mapper};
use crate::places::PlacesClient;
use crate::{language, ranking, region};

/// Observes stage-by-stage progress, decoupling the orchestrator from how
/// (or whether) progress is published — the WS `status` channel publisher
/// is the production implementation; tests use a no-op or recording one.
pub trait StageObserver: Send + Sync {
    fn emit(&self, stage: &str, payload: serde_json::Value);
}

pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn emit(&self, _stage: &str, _payload: serde_json::Value) {}
}

/// Per-request input to the pipeline, already past JWT/job-creation.
pub struct Route2Context {
    pub query: String,
    pub user_location: Option<crate::model::LatLng>,
    pub locale: Option<String>,
    pub explicit_filters: Option<RequestFilters>,
}

pub struct Route2Orchestrator {
    config: Arc<Config>,
    llm: Arc<dyn LlmClient>,
    places: Arc<dyn PlacesClient>,
    llm_health: HealthTracker,
    places_health: HealthTracker,
}

impl Route2Orchestrator {
    pub fn new(config: Arc<Config>, llm: Arc<dyn LlmClient>, places: Arc<dyn PlacesClient>) -> Self {
        let llm_health = HealthTracker::new(config.gateway.health_window, config.gateway.health_error_threshold);
        let places_health = HealthTracker::new(config.gateway.health_window, config.gateway.health_error_threshold);
        Self { config, llm, places, llm_health, places_health }
    }

    #[tracing::instrument(skip(self, context, observer), fields(stage = tracing::field::Empty))]
    pub async fn run(
        &self,
        context: Route2Context,
        observer: &dyn StageObserver,
    ) -> Result<SearchResponse, (PipelineErrorKind, String)> {
        let language = language::resolve_language(context.locale.as_deref(), &context.query);

        if self.llm_health.check().is_err() {
            return Err((PipelineErrorKind::ProviderUnhealthy, "llm provider recent error rate exceeds threshold".to_string()));
        }

        Span::current().record("stage", "gate2");
        observer.emit("gate2", serde_json::json!({"status": "running"}));
        let gate_timeout = Duration::from_millis(self.config.llm.gate.timeout_ms);
        let gate = gate2::run_gate2(self.llm.as_ref(), &self.config.llm.gate.model, gate_timeout, &context.query)
            .await
            .map_err(|e| {
                self.llm_health.record(false);
                (classify_llm_error(matches!(e, LlmError::Timeout(_)), matches!(e, LlmError::SchemaInvalid(_))), e.to_string())
            })?;
        self.llm_health.record(true);

        observer.emit(
            "gate2",
            serde_json::json!({"status": format!("{:?}", gate.action), "confidence": gate.confidence, "reason": gate.reason.as_str()}),
        );
        match gate.action {
            GateAction::Stop => return Ok(SearchResponse::empty("route2_gate_stop", FailureReason::LowConfidence)),
            GateAction::Clarify => return Ok(SearchResponse::empty("route2_gate_clarify", FailureReason::LowConfidence)),
            GateAction::Continue => {}
        }

        // Base filters and post-constraints are independent LLM calls over
        // the same query — fired here as un-awaited tasks so they run
        // concurrently with Intent and the Route-LLM mapper below, joined
        // only once their results are actually needed.
        let base_filters_task: JoinHandle<Result<filters::SharedFilters, LlmError>> = {
            let llm = Arc::clone(&self.llm);
            let model = self.config.llm.base_filters.model.clone();
            let timeout = Duration::from_millis(self.config.llm.base_filters.timeout_ms);
            let query = context.query.clone();
            tokio::spawn(async move { filters::infer_base_filters(llm.as_ref(), &model, timeout, &query).await })
        };
        let post_constraints_task: JoinHandle<Result<PostConstraints, LlmError>> = {
            let llm = Arc::clone(&self.llm);
            let model = self.config.llm.post_constraints.model.clone();
            let timeout = Duration::from_millis(self.config.llm.post_constraints.timeout_ms);
            let query = context.query.clone();
            tokio::spawn(async move { post_constraints::infer_post_constraints(llm.as_ref(), &model, timeout, &query).await })
        };

        Span::current().record("stage", "intent");
        let intent_timeout = Duration::from_millis(self.config.llm.intent.timeout_ms);
        let intent_result = match intent::run_intent(
            self.llm.as_ref(),
            &self.config.llm.intent.model,
            intent_timeout,
            &context.query,
        )
        .await
        {
            Ok(result) => result,
            Err(e) => {
                let reason = match e {
                    LlmError::Timeout(_) => IntentReason::FallbackTimeout,
                    LlmError::SchemaInvalid(_) => IntentReason::FallbackSchemaInvalid,
                    LlmError::Failed(_) => IntentReason::FallbackError,
                };
                intent::passthrough(reason)
            }
        };
        observer.emit(
            "intent",
            serde_json::json!({"route": format!("{:?}", intent_result.route), "reason": intent_result.reason.as_str()}),
        );

        match intent_result.route {
            IntentRoute::Stop => {
                base_filters_task.abort();
                post_constraints_task.abort();
                return Ok(SearchResponse::empty("route2_intent_stop", FailureReason::LowConfidence));
            }
            IntentRoute::Clarify => {
                base_filters_task.abort();
                post_constraints_task.abort();
                return Ok(SearchResponse::empty("route2_clarify", FailureReason::LowConfidence));
            }
            _ => {}
        }

        Span::current().record("stage", "nearme_guard");
        // Always checked against the original query text, never an
        // LLM-normalized one, so normalization drift can't mask or invent a
        // near-me phrasing; Intent's own `nearMe` advisory is folded in
        // alongside it rather than trusted on its own.
        let is_near_me = nearme::is_near_me_query(&context.query) || intent_result.near_me;
        if is_near_me && context.user_location.is_none() {
            // A missing location on a near-me query is a normal, recoverable
            // outcome (the client is asked to supply one), not a pipeline
            // failure: empty results with a CLARIFY narration, same shape as
            // the gate-stop and clarify-needed short-circuits above, never a
            // FAILED job.
            observer.emit("nearme_guard", serde_json::json!({"status": "location_required"}));
            base_filters_task.abort();
            post_constraints_task.abort();
            return Ok(SearchResponse::empty("route2_nearme_no_location", FailureReason::LocationRequired));
        }
        if let Some(loc) = context.user_location {
            if is_near_me && (!(-90.0..=90.0).contains(&loc.lat) || !(-180.0..=180.0).contains(&loc.lng)) {
                base_filters_task.abort();
                post_constraints_task.abort();
                return Err((PipelineErrorKind::NearMeInvalidLocation, "user location out of range".to_string()));
            }
        }

        Span::current().record("stage", "route_mapper");
        let region_code = region::resolve_region_code(
            context.user_location,
            intent_result.region_candidate.as_deref(),
            context.locale.as_deref(),
            language,
            self.config.google_maps.default_region_code.as_deref(),
        );
        let mapper_timeout = Duration::from_millis(self.config.llm.route_mapper.timeout_ms);
        let mapper_outcome = route_mapper::run_route_mapper(
            self.llm.as_ref(),
            &self.config.llm.route_mapper.model,
            mapper_timeout,
            &context.query,
            is_near_me,
            context.user_location,
            region_code.clone(),
        )
        .await
        .map_err(|e| {
            self.llm_health.record(false);
            base_filters_task.abort();
            post_constraints_task.abort();
            (classify_llm_error(matches!(e, LlmError::Timeout(_)), matches!(e, LlmError::SchemaInvalid(_))), e.to_string())
        })?;
        self.llm_health.record(true);

        let places_request = match mapper_outcome {
            RouteMapperOutcome::Request(request) => request,
            RouteMapperOutcome::NeedsLocation => {
                observer.emit("route_mapper", serde_json::json!({"status": "location_required"}));
                base_filters_task.abort();
                post_constraints_task.abort();
                return Ok(SearchResponse::empty("route2_nearme_no_location", FailureReason::LocationRequired));
            }
        };
        observer.emit("route_mapper", serde_json::json!({"status": "resolved"}));

        Span::current().record("stage", "filters_resolve");
        let inferred = match base_filters_task.await {
            Ok(Ok(filters)) => filters,
            Ok(Err(e)) => {
                warn!(error = %e, "base filters inference failed, proceeding without inferred filters");
                filters::SharedFilters::default()
            }
            Err(e) => {
                warn!(error = %e, "base filters task did not complete");
                filters::SharedFilters::default()
            }
        };
        let resolved_filters = filters::merge_filters(inferred, context.explicit_filters.as_ref());
        let places_request = filters::apply_base_filters_to_request(places_request, &resolved_filters);

        Span::current().record("stage", "google_maps");
        if self.places_health.check().is_err() {
            post_constraints_task.abort();
            return Err((PipelineErrorKind::ProviderUnhealthy, "places provider recent error rate exceeds threshold".to_string()));
        }
        let google_timeout = Duration::from_millis(self.config.google_maps.timeout_ms);
        let mut results =
            google_maps::run_google_maps_stage(self.places.as_ref(), places_request, google_timeout, context.user_location)
                .await
                .map_err(|e| {
                    self.places_health.record(false);
                    post_constraints_task.abort();
                    e
                })?;
        self.places_health.record(true);
        observer.emit("google_maps", serde_json::json!({"resultCount": results.len()}));

        Span::current().record("stage", "post_filter");
        let constraints = match post_constraints_task.await {
            Ok(Ok(constraints)) => constraints,
            Ok(Err(e)) => {
                warn!(error = %e, "post-constraints inference failed, proceeding without soft hints");
                PostConstraints::default()
            }
            Err(e) => {
                warn!(error = %e, "post-constraints task did not complete");
                PostConstraints::default()
            }
        };
        let (soft_terms, soft_labels) = post_constraints::soft_hints(&constraints);
        ranking::rank_and_sort(&mut results, &soft_terms);

        if results.is_empty() {
            return Ok(SearchResponse::empty("route2_no_results", FailureReason::LowConfidence));
        }

        let mut applied_filters = applied_filter_labels(&resolved_filters);
        applied_filters.extend(soft_labels);
        let chips = ranking::build_chips(&results, &applied_filters);

        Ok(SearchResponse {
            results,
            meta: ResponseMeta {
                source: "route2".to_string(),
                failure_reason: None,
                region_code,
                applied_filters,
                chips,
            },
        })
    }
}

fn applied_filter_labels(filters: &filters::SharedFilters) -> Vec<String> {
    let mut labels = Vec::new();
    if filters.open_now == Some(true) {
        labels.push("openNow".to_string());
    }
    if filters.price_level.is_some() {
        labels.push("priceLevel".to_string());
    }
    labels.extend(filters.dietary.iter().cloned());
    labels.extend(filters.must_have.iter().cloned());
    labels
}

#[allow(dead_code)]
fn language_is_set(language: Language) -> bool {
    !matches!(language, Language::Other)
}
