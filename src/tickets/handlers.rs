use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequestParts, Path, State},
    http::{header::CONTENT_TYPE, request::Parts, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::state::AppState;

use super::assignment::WorkloadEntry;
use super::constants::{ACTIVE_ROLE_HEADER, USER_ID_HEADER, USER_ROLES_HEADER};
use super::error::TicketError;
use super::report::ConfigIssue;
use super::roles::{ActorContext, RoleSet};
use super::types::{
    ActionView, CreateTicketRequest, ExecuteTransitionRequest, Ticket, TimelineEntry,
    WorkflowStatus,
};
use super::workflow::TransitionOutcome;

/// Caller identity as forwarded by the auth proxy in front of the service.
pub struct Actor(pub ActorContext);

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn actor_from_headers(headers: &HeaderMap) -> Result<ActorContext, TicketError> {
    let user_id = header(headers, USER_ID_HEADER)
        .ok_or_else(|| TicketError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
    let user_id = Uuid::parse_str(user_id)
        .map_err(|_| TicketError::Unauthorized(format!("invalid {USER_ID_HEADER} header")))?;

    let roles = header(headers, USER_ROLES_HEADER)
        .map(RoleSet::parse)
        .unwrap_or_default();

    let actor = ActorContext::new(user_id, roles);
    Ok(match header(headers, ACTIVE_ROLE_HEADER) {
        Some(active) => actor.with_active_role(active),
        None => actor,
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = TicketError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers).map(Actor)
    }
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    header(headers, CONTENT_TYPE.as_str())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

/// Transition bodies are optional. An empty body means no input, anything
/// else must be a well-formed JSON request.
pub fn transition_input(
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Option<serde_json::Value>, TicketError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    if !is_json_content_type(headers) {
        return Err(TicketError::Validation(
            "expected request with `Content-Type: application/json`".to_string(),
        ));
    }
    Json::<ExecuteTransitionRequest>::from_bytes(body)
        .map(|Json(request)| request.input)
        .map_err(|rejection| TicketError::Validation(rejection.body_text()))
}

async fn run_blocking<T, F>(task: F) -> Result<T, TicketError>
where
    F: FnOnce() -> Result<T, TicketError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| TicketError::Internal(format!("Task error: {e}")))?
}

pub fn ticket_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", post(create_ticket_handler))
        .route("/api/tickets/:id", get(get_ticket_handler))
        .route("/api/tickets/:id/actions", get(list_actions_handler))
        .route(
            "/api/tickets/:id/transitions/:transition_id",
            post(execute_transition_handler),
        )
        .route("/api/tickets/:id/timeline", get(timeline_handler))
        .route("/api/workflow/statuses", get(statuses_handler))
        .route("/api/workflow/report", get(report_handler))
        .route("/api/workload/:role", get(workload_handler))
}

async fn create_ticket_handler(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Json(request): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Ticket>), TicketError> {
    let service = state.tickets.clone();
    let ticket = run_blocking(move || service.create_ticket(&actor, request)).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn get_ticket_handler(
    State(state): State<Arc<AppState>>,
    Actor(_actor): Actor,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Ticket>, TicketError> {
    let service = state.tickets.clone();
    run_blocking(move || service.get_ticket(ticket_id))
        .await
        .map(Json)
}

async fn list_actions_handler(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Vec<ActionView>>, TicketError> {
    let service = state.tickets.clone();
    run_blocking(move || service.available_actions(ticket_id, &actor))
        .await
        .map(Json)
}

async fn execute_transition_handler(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path((ticket_id, transition_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, TicketError> {
    let input = transition_input(&headers, &body)?;
    let service = state.tickets.clone();
    let TransitionOutcome {
        ticket,
        transition,
        old_status,
    } = run_blocking(move || service.execute_transition(ticket_id, transition_id, &actor, input))
        .await?;

    Ok(Json(serde_json::json!({
        "ticket": ticket,
        "transition_id": transition.id,
        "action": transition.label,
        "old_status": old_status,
        "new_status": ticket.status,
    })))
}

async fn timeline_handler(
    State(state): State<Arc<AppState>>,
    Actor(_actor): Actor,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Vec<TimelineEntry>>, TicketError> {
    let service = state.tickets.clone();
    run_blocking(move || service.timeline(ticket_id))
        .await
        .map(Json)
}

async fn statuses_handler(
    State(state): State<Arc<AppState>>,
    Actor(_actor): Actor,
) -> Result<Json<Vec<WorkflowStatus>>, TicketError> {
    let service = state.tickets.clone();
    run_blocking(move || service.statuses()).await.map(Json)
}

async fn report_handler(
    State(state): State<Arc<AppState>>,
    Actor(_actor): Actor,
) -> Result<Json<Vec<ConfigIssue>>, TicketError> {
    let service = state.tickets.clone();
    run_blocking(move || service.configuration_report())
        .await
        .map(Json)
}

async fn workload_handler(
    State(state): State<Arc<AppState>>,
    Actor(_actor): Actor,
    Path(role): Path<String>,
) -> Result<Json<Vec<WorkloadEntry>>, TicketError> {
    let service = state.tickets.clone();
    run_blocking(move || service.workload_report(&role))
        .await
        .map(Json)
}
