//! Allowlist lookup endpoints.
//!
//! Thin translation over the snapshot cache: every handler copies data out
//! of the cache and never holds its lock across I/O.

use axum::{
    extract::{Path, State},
    Json,
};
use gatewarden_types::{AllowListEntry, Error};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    handlers::AppState,
    pagination::{Paginated, PaginationQuery},
};

/// Digest and size of the currently served snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestResponse {
    pub digest: String,
    pub entries: usize,
}

/// List entries in insertion order
///
/// GET /gate/v1/entries
pub async fn list_entries(
    State(state): State<AppState>,
    pagination: PaginationQuery,
) -> Result<Json<Paginated<AllowListEntry>>> {
    let params = pagination.0.validate();
    let total = state.cache.len().await;
    let page = state.cache.iterate(params.offset, params.limit).await;
    Ok(Json(Paginated::with_total(page, total, &params)))
}

/// Look up an entry by phone number
///
/// GET /gate/v1/entries/by-phone/{phone}
pub async fn get_by_phone(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> Result<Json<AllowListEntry>> {
    state
        .cache
        .get_by_phone(&phone)
        .await
        .map(Json)
        .ok_or_else(|| Error::not_found(format!("no entry for phone {phone}")).into())
}

/// Look up an entry by mail address (case-insensitive)
///
/// GET /gate/v1/entries/by-mail/{mail}
pub async fn get_by_mail(
    State(state): State<AppState>,
    Path(mail): Path<String>,
) -> Result<Json<AllowListEntry>> {
    state
        .cache
        .get_by_mail(&mail)
        .await
        .map(Json)
        .ok_or_else(|| Error::not_found(format!("no entry for mail {mail}")).into())
}

/// Look up an entry by user id
///
/// GET /gate/v1/entries/by-user-id/{user_id}
pub async fn get_by_user_id(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<AllowListEntry>> {
    state
        .cache
        .get_by_user_id(&user_id)
        .await
        .map(Json)
        .ok_or_else(|| Error::not_found(format!("no entry for user id {user_id}")).into())
}

/// Content digest of the served snapshot
///
/// GET /gate/v1/digest
pub async fn get_digest(State(state): State<AppState>) -> Result<Json<DigestResponse>> {
    Ok(Json(DigestResponse {
        digest: state.cache.digest().await,
        entries: state.cache.len().await,
    }))
}
