use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::domain::{
    ListingId, ListingStatus, ListingSubmission, MatchId, TenantProfileId, TenantSubmission,
    UserId,
};
use super::index::IndexError;
use super::lifecycle::LifecycleError;
use super::messaging::{MessageDraft, MessagingError};
use super::ranking::RankingError;
use super::repository::RepositoryError;
use super::service::{MatchingError, MatchingService};

type SharedService = State<Arc<MatchingService>>;

/// Router exposing profile, listing, match and messaging endpoints.
pub fn matching_router(service: Arc<MatchingService>) -> Router {
    Router::new()
        .route("/api/v1/tenants", post(create_tenant))
        .route("/api/v1/tenants/:id", axum::routing::put(update_tenant))
        .route("/api/v1/tenants/:id/deactivate", post(deactivate_tenant))
        .route("/api/v1/tenants/:id/rescan", post(rescan_tenant))
        .route("/api/v1/tenants/:id/matches", get(tenant_matches))
        .route("/api/v1/listings", post(create_listing))
        .route("/api/v1/listings/:id", axum::routing::put(update_listing))
        .route("/api/v1/listings/:id/status", post(listing_status))
        .route("/api/v1/listings/:id/rescan", post(rescan_listing))
        .route("/api/v1/listings/:id/matches", get(listing_matches))
        .route("/api/v1/matches/:id/open", post(open_match))
        .route("/api/v1/matches/:id/interest", post(set_interest))
        .route(
            "/api/v1/matches/:id/messages",
            get(message_thread).post(post_message),
        )
        .route("/api/v1/matches/:id/read", post(mark_read))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct TenantRequest {
    pub(crate) user_id: UserId,
    #[serde(flatten)]
    pub(crate) profile: TenantSubmission,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingRequest {
    pub(crate) landlord_id: UserId,
    #[serde(flatten)]
    pub(crate) listing: ListingSubmission,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusRequest {
    pub(crate) landlord_id: UserId,
    pub(crate) status: ListingStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageQuery {
    pub(crate) cursor: Option<String>,
    pub(crate) page_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActorRequest {
    pub(crate) user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InterestRequest {
    pub(crate) user_id: UserId,
    pub(crate) interested: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReaderQuery {
    pub(crate) reader: UserId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostMessageRequest {
    pub(crate) sender_id: UserId,
    #[serde(flatten)]
    pub(crate) draft: MessageDraft,
}

pub(crate) async fn create_tenant(
    State(service): SharedService,
    Json(request): Json<TenantRequest>,
) -> Response {
    respond(
        StatusCode::CREATED,
        service.create_tenant(request.user_id, request.profile),
    )
}

pub(crate) async fn update_tenant(
    State(service): SharedService,
    Path(id): Path<Uuid>,
    Json(request): Json<TenantRequest>,
) -> Response {
    respond(
        StatusCode::OK,
        service.update_tenant(request.user_id, TenantProfileId(id), request.profile),
    )
}

pub(crate) async fn deactivate_tenant(
    State(service): SharedService,
    Path(id): Path<Uuid>,
    Json(request): Json<ActorRequest>,
) -> Response {
    respond(
        StatusCode::OK,
        service.deactivate_tenant(request.user_id, TenantProfileId(id)),
    )
}

pub(crate) async fn rescan_tenant(State(service): SharedService, Path(id): Path<Uuid>) -> Response {
    match service.compute_matches_for_tenant(TenantProfileId(id)) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn tenant_matches(
    State(service): SharedService,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Response {
    respond(
        StatusCode::OK,
        service.matches_for_tenant(TenantProfileId(id), page.cursor.as_deref(), page.page_size),
    )
}

pub(crate) async fn create_listing(
    State(service): SharedService,
    Json(request): Json<ListingRequest>,
) -> Response {
    respond(
        StatusCode::CREATED,
        service
            .create_listing(request.landlord_id, request.listing)
            .await,
    )
}

pub(crate) async fn update_listing(
    State(service): SharedService,
    Path(id): Path<Uuid>,
    Json(request): Json<ListingRequest>,
) -> Response {
    respond(
        StatusCode::OK,
        service
            .update_listing(request.landlord_id, ListingId(id), request.listing)
            .await,
    )
}

pub(crate) async fn listing_status(
    State(service): SharedService,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> Response {
    respond(
        StatusCode::OK,
        service.set_listing_status(request.landlord_id, ListingId(id), request.status),
    )
}

pub(crate) async fn rescan_listing(State(service): SharedService, Path(id): Path<Uuid>) -> Response {
    match service.compute_matches_for_listing(ListingId(id)) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn listing_matches(
    State(service): SharedService,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Response {
    respond(
        StatusCode::OK,
        service.matches_for_listing(ListingId(id), page.cursor.as_deref(), page.page_size),
    )
}

pub(crate) async fn open_match(
    State(service): SharedService,
    Path(id): Path<Uuid>,
    Json(request): Json<ActorRequest>,
) -> Response {
    respond(StatusCode::OK, service.open_match(MatchId(id), request.user_id))
}

pub(crate) async fn set_interest(
    State(service): SharedService,
    Path(id): Path<Uuid>,
    Json(request): Json<InterestRequest>,
) -> Response {
    respond(
        StatusCode::OK,
        service.set_interest(MatchId(id), request.user_id, request.interested),
    )
}

pub(crate) async fn message_thread(
    State(service): SharedService,
    Path(id): Path<Uuid>,
    Query(query): Query<ReaderQuery>,
) -> Response {
    respond(StatusCode::OK, service.thread(MatchId(id), query.reader))
}

pub(crate) async fn post_message(
    State(service): SharedService,
    Path(id): Path<Uuid>,
    Json(request): Json<PostMessageRequest>,
) -> Response {
    respond(
        StatusCode::CREATED,
        service.post(MatchId(id), request.sender_id, request.draft),
    )
}

pub(crate) async fn mark_read(
    State(service): SharedService,
    Path(id): Path<Uuid>,
    Json(request): Json<ActorRequest>,
) -> Response {
    match service.mark_read(MatchId(id), request.user_id) {
        Ok(marked) => (StatusCode::OK, Json(json!({ "marked": marked }))).into_response(),
        Err(error) => error_response(error),
    }
}

fn respond<T: serde::Serialize>(success: StatusCode, result: Result<T, MatchingError>) -> Response {
    match result {
        Ok(body) => (success, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) fn error_response(error: MatchingError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(%error, "matching request failed");
    }
    let payload = json!({ "error": error.to_string() });
    (status, Json(payload)).into_response()
}

pub(crate) fn status_for(error: &MatchingError) -> StatusCode {
    use MatchingError as E;
    match error {
        E::Validation(_)
        | E::Ranking(RankingError::Validation(_))
        | E::Messaging(MessagingError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        E::TenantNotFound(_)
        | E::ListingNotFound(_)
        | E::MatchNotFound(_)
        | E::Lifecycle(LifecycleError::NotFound(_))
        | E::Messaging(MessagingError::NotFound(_))
        | E::Index(IndexError::TenantNotFound(_) | IndexError::ListingNotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        E::NotOwner { .. }
        | E::NotProfileOwner { .. }
        | E::NotParticipant { .. }
        | E::Messaging(MessagingError::InvalidSender { .. }) => StatusCode::FORBIDDEN,
        E::DuplicateProfile(_)
        | E::Lifecycle(LifecycleError::Terminal { .. } | LifecycleError::ConcurrencyConflict(_))
        | E::Messaging(
            MessagingError::MatchTerminal { .. } | MessagingError::ConcurrencyConflict(_),
        )
        | E::Repository(RepositoryError::Conflict | RepositoryError::VersionConflict { .. }) => {
            StatusCode::CONFLICT
        }
        E::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
