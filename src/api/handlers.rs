//! API Handlers
//!
//! HTTP request handlers for the worker's control endpoints and for every
//! intercepted request.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Query, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream};
use tracing::{debug, warn};
use url::{Origin, Url};

use crate::error::{Result, WorkerError};
use crate::fetch::{FetchRequest, HOP_BY_HOP};
use crate::models::{
    EventsQuery, HealthResponse, MessageRequest, MessageResponse, StatsResponse, StatusResponse,
};
use crate::worker::{Intercepted, PageMessage, ServiceWorker, WorkerState};

/// Response header naming where an intercepted response came from.
pub const CACHE_STATUS_HEADER: &str = "x-shell-cache";

/// Largest request body forwarded to the network.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The active worker
    pub worker: Arc<ServiceWorker>,
    /// Release version reported by the status endpoint
    pub version: String,
    /// Origins an intercepted request may target
    forwardable: Arc<Vec<Origin>>,
}

impl AppState {
    /// Creates a new AppState around a started worker.
    ///
    /// Requests may target the worker's origin and any origin named in its
    /// precache manifest.
    pub fn new(worker: Arc<ServiceWorker>, version: impl Into<String>) -> Self {
        let mut forwardable = vec![worker.context().origin.origin()];
        for url in worker.manifest().urls() {
            let origin = url.origin();
            if !forwardable.contains(&origin) {
                forwardable.push(origin);
            }
        }
        Self {
            worker,
            version: version.into(),
            forwardable: Arc::new(forwardable),
        }
    }

    /// Allows requests to target `origins` as well.
    pub fn with_passthrough_origins(mut self, origins: impl IntoIterator<Item = Origin>) -> Self {
        let forwardable = Arc::make_mut(&mut self.forwardable);
        for origin in origins {
            if !forwardable.contains(&origin) {
                forwardable.push(origin);
            }
        }
        self
    }

    /// Refuses targets outside the worker's origin, its manifest origins and
    /// the configured passthrough origins.
    pub fn check_target(&self, url: &Url) -> Result<()> {
        let origin = url.origin();
        if self.forwardable.contains(&origin) {
            Ok(())
        } else {
            Err(WorkerError::Forbidden(format!(
                "will not forward to {}",
                origin.ascii_serialization()
            )))
        }
    }
}

/// Handler for POST /__worker/message
///
/// `REFRESH_APP` is accepted and runs on its own task; completion is announced
/// on the event stream. `SKIP_WAITING` activates a waiting worker.
pub async fn message_handler(
    State(state): State<AppState>,
    Json(message): Json<MessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    match message {
        PageMessage::RefreshApp => {
            let worker = state.worker.clone();
            tokio::spawn(async move {
                if let Err(err) = worker.refresh().await {
                    warn!("REFRESH_APP failed: {}", err);
                }
            });
            Ok((StatusCode::ACCEPTED, Json(MessageResponse::refresh_accepted())))
        }
        PageMessage::SkipWaiting => {
            let new_state = state.worker.skip_waiting().await?;
            Ok((StatusCode::OK, Json(MessageResponse::skip_waiting(new_state))))
        }
    }
}

/// Handler for GET /__worker/events
///
/// Registers the caller as a page and streams every worker message to it as
/// a `message` event.
pub async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    if let Some(error_msg) = query.validate() {
        return Err(WorkerError::InvalidRequest(error_msg));
    }

    let clients = &state.worker.context().clients;
    let client = if query.controlled && state.worker.state().await == WorkerState::Activated {
        clients.connect_controlled(query.url).await
    } else {
        clients.connect(query.url).await
    };
    debug!("Event stream opened for {}", client.id);

    let events = stream::unfold(client, |mut client| async move {
        let message = client.recv().await?;
        let event = Event::default().event("message").json_data(message);
        Some((event, client))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Handler for GET /__worker/status
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let worker = &state.worker;
    let (current, generations, stats) = {
        let store = worker.context().store.read().await;
        (
            store.current().map(str::to_string),
            store.summaries(),
            store.stats(),
        )
    };

    Json(StatusResponse {
        version: state.version.clone(),
        generation: worker.generation().to_string(),
        state: worker.state().await,
        current,
        refreshing: worker.is_refreshing().await,
        options: worker.options(),
        generations,
        stats: StatsResponse::from(stats),
        clients: worker.context().clients.list().await,
    })
}

/// Handler for GET /__worker/health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Fallback handler: every other request goes through the worker.
pub async fn intercept_handler(State(state): State<AppState>, request: Request) -> Result<Response> {
    let request = to_fetch_request(&state.worker.context().origin, request).await?;
    state.check_target(&request.url)?;
    let intercepted = state.worker.handle_fetch(request).await?;
    into_http_response(intercepted)
}

/// Converts an incoming request into the worker's view of it.
///
/// Origin-form targets are resolved against the worker's origin. Absolute-form
/// targets keep their own host, so a target on another host is cross-origin;
/// [`AppState::check_target`] decides whether it may be forwarded.
pub async fn to_fetch_request(origin: &Url, request: Request) -> Result<FetchRequest> {
    let (parts, body) = request.into_parts();

    let url = if parts.uri.scheme().is_some() && parts.uri.authority().is_some() {
        Url::parse(&parts.uri.to_string())?
    } else {
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        origin.join(target)?
    };

    let mut fetch = FetchRequest::get(url).with_method(parts.method.as_str());
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            fetch = fetch.with_header(name.as_str(), value);
        }
    }

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| WorkerError::InvalidRequest(format!("unreadable request body: {}", e)))?;
    Ok(fetch.with_body(body.to_vec()))
}

/// Replays a worker response, tagged with where it came from.
pub fn into_http_response(intercepted: Intercepted) -> Result<Response> {
    let Intercepted { response, source } = intercepted;
    let status = StatusCode::from_u16(response.status)
        .map_err(|e| WorkerError::Internal(format!("bad upstream status: {}", e)))?;

    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = status;
    let headers = http.headers_mut();
    for (name, value) in &response.headers {
        if name == "content-length" || HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers.insert(
        CACHE_STATUS_HEADER,
        HeaderValue::from_static(source.as_header_value()),
    );

    Ok(http.into_response())
}
