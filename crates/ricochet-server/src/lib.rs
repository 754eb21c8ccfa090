//! HTTP transport for ricochet
//!
//! The browser side of a build form talks to this router:
//! - `POST /jobs/{job}/renders` opens one render per parameter of a job
//! - `POST /renders/{id}/update` delivers a wire payload
//! - `GET /renders/{id}/choices`, `/choices-as-string` and `/visible` read the
//!   current results
//! - `DELETE /renders/{id}` closes a render
//!
//! Script evaluation runs on the blocking pool. Renders left idle past the
//! registry's TTL are swept by [`spawn_idle_sweeper`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use ricochet::{ChoicesForUi, Engine, ParameterRender, RenderRegistry};
use ricochet_config::ResolvedConfig;
use serde::{Deserialize, Serialize};

/// State shared across handlers
pub struct AppState {
    pub engine: Engine,
    pub config: ResolvedConfig,
    pub renders: RenderRegistry,
}

impl AppState {
    pub fn new(engine: Engine, config: ResolvedConfig) -> Self {
        Self {
            engine,
            config,
            renders: RenderRegistry::new(),
        }
    }

    /// Close renders that stay untouched for longer than `ttl`
    pub fn with_render_ttl(mut self, ttl: Duration) -> Self {
        self.renders = RenderRegistry::with_idle_ttl(ttl);
        self
    }
}

/// Periodically drop idle renders, at half the registry's TTL
pub fn spawn_idle_sweeper(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let period = (state.renders.idle_ttl() / 2).max(Duration::from_millis(10));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let evicted = state.renders.evict_idle();
            if evicted > 0 {
                tracing::info!(evicted, live = state.renders.len(), "closed idle renders");
            }
        }
    })
}

/// Handler failure, rendered as a plain-text response
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, message).into_response()
    }
}

fn unknown_render(render_id: &str) -> ApiError {
    ApiError::NotFound(format!("unknown render `{render_id}`"))
}

/// One opened render, as returned by `POST /jobs/{job}/renders`
#[derive(Debug, Serialize, Deserialize)]
pub struct RenderInfo {
    pub name: String,
    pub render_id: String,
    pub kind: String,
    pub choice_type: String,
    pub referenced_parameters: Vec<String>,
    pub omit_value_field: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChoicesQuery {
    #[serde(default)]
    pub filter: Option<String>,
}

/// Build the axum router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/jobs/{job}/renders", post(create_renders))
        .route("/renders/{render_id}", delete(delete_render))
        .route("/renders/{render_id}/update", post(update_render))
        .route("/renders/{render_id}/choices", get(choices))
        .route("/renders/{render_id}/choices-as-string", get(choices_as_string))
        .route("/renders/{render_id}/visible", get(visible))
        .with_state(state)
        .layer(middleware::from_fn(log_requests))
}

async fn create_renders(
    State(state): State<Arc<AppState>>,
    Path(job_name): Path<String>,
) -> Result<Json<Vec<RenderInfo>>, ApiError> {
    let job = state
        .config
        .job(&job_name)
        .ok_or_else(|| ApiError::NotFound(format!("unknown job `{job_name}`")))?;

    let mut opened = Vec::with_capacity(job.parameters.len());
    for parameter in &job.parameters {
        let render = state
            .engine
            .render(parameter.clone(), Some(job.job.clone()))
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        opened.push(RenderInfo {
            name: parameter.name().to_string(),
            render_id: render.render_id().to_string(),
            kind: parameter.kind().to_string(),
            choice_type: parameter.choice_type().to_string(),
            referenced_parameters: parameter.referenced_names().to_vec(),
            omit_value_field: parameter.omit_value_field(),
        });
        state.renders.insert(render);
    }
    tracing::info!(job = %job_name, renders = opened.len(), "opened renders");
    Ok(Json(opened))
}

async fn update_render(
    State(state): State<Arc<AppState>>,
    Path(render_id): Path<String>,
    payload: String,
) -> Result<StatusCode, ApiError> {
    state
        .renders
        .with_render_mut(&render_id, |render| render.apply_update(&payload))
        .ok_or_else(|| unknown_render(&render_id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_render(
    State(state): State<Arc<AppState>>,
    Path(render_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .renders
        .remove(&render_id)
        .ok_or_else(|| unknown_render(&render_id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn choices(
    State(state): State<Arc<AppState>>,
    Path(render_id): Path<String>,
    Query(query): Query<ChoicesQuery>,
) -> Result<Response, ApiError> {
    let ui: ChoicesForUi = evaluate(&state, &render_id, move |render| match &query.filter {
        Some(text) => render.filtered_choices_for_ui(text),
        None => render.choices_for_ui(),
    })
    .await?;

    Ok(([(header::CONTENT_TYPE, "application/json")], ui.to_json()).into_response())
}

async fn choices_as_string(
    State(state): State<Arc<AppState>>,
    Path(render_id): Path<String>,
) -> Result<String, ApiError> {
    evaluate(&state, &render_id, |render| render.choices_as_string()).await
}

async fn visible(
    State(state): State<Arc<AppState>>,
    Path(render_id): Path<String>,
) -> Result<Json<bool>, ApiError> {
    evaluate(&state, &render_id, |render| render.is_visible())
        .await
        .map(Json)
}

/// Snapshot a render and run `f` against it on the blocking pool
async fn evaluate<R, F>(state: &AppState, render_id: &str, f: F) -> Result<R, ApiError>
where
    F: FnOnce(&ParameterRender) -> R + Send + 'static,
    R: Send + 'static,
{
    let render = state
        .renders
        .with_render(render_id, ParameterRender::clone)
        .ok_or_else(|| unknown_render(render_id))?;

    tokio::task::spawn_blocking(move || f(&render))
        .await
        .map_err(|e| ApiError::Internal(format!("evaluation task failed: {e}")))
}

/// Logging middleware
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let mut response = next.run(request).await;

    response
        .headers_mut()
        .insert("x-served-by", HeaderValue::from_static("ricochet-serve"));

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

    match status {
        500.. => tracing::error!(%method, %path, status, latency_ms, "request failed"),
        400..500 => tracing::warn!(%method, %path, status, latency_ms, "request rejected"),
        _ => tracing::info!(%method, %path, status, latency_ms, "request"),
    }

    response
}
