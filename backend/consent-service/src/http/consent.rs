/// Consent endpoints
///
/// The challenge is verified on `GET`, stored server-side under a fresh
/// session id, and the id travels in the `idp_challenge` cookie until the
/// user's decision arrives on `POST`.
use axum::{
    extract::{Form, Query, State},
    http::{
        header::{COOKIE, LOCATION, SET_COOKIE, WWW_AUTHENTICATE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::AppState;
use crate::error::{IdpError, Result};
use crate::store::SESSION_COOKIE_NAME;

#[derive(Debug, Deserialize)]
pub struct ConsentQuery {
    pub challenge: Option<String>,
}

/// Body of `GET /consent`
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingConsent {
    pub client: String,
    pub user: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Form of `POST /consent`
#[derive(Debug, Deserialize)]
pub struct ConsentDecision {
    /// `allow` or `deny`
    pub decision: String,
    /// Space-separated subset of the requested scopes. All when absent.
    pub scope: Option<String>,
}

pub(super) async fn begin_consent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ConsentQuery>,
) -> Result<Response> {
    let user = match state.provider.check(&headers) {
        Ok(user) => user,
        Err(e) => {
            let mut response = e.into_response();
            if let Ok(value) = state.provider.challenge_header().parse() {
                response.headers_mut().insert(WWW_AUTHENTICATE, value);
            }
            return Ok(response);
        }
    };

    let challenge = state
        .idp
        .new_challenge(query.challenge.as_deref(), &user)
        .await?;

    let session_id = Uuid::new_v4().to_string();
    challenge.save(&session_id).await?;

    info!(
        client = %challenge.client(),
        user = %challenge.user(),
        "Consent session opened"
    );

    let ttl = state.idp.config().challenge_session_ttl.as_secs();
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE_NAME, session_id, ttl
    );

    let body = PendingConsent {
        client: challenge.client().to_string(),
        user: challenge.user().to_string(),
        scopes: challenge.scopes().to_vec(),
        expires_at: challenge.expires(),
    };

    Ok(([(SET_COOKIE, cookie)], Json(body)).into_response())
}

pub(super) async fn finish_consent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<ConsentDecision>,
) -> Result<Response> {
    let session_id = session_cookie(&headers);
    let challenge = state.idp.get_challenge(session_id.as_deref()).await?;

    let location = match form.decision.as_str() {
        "allow" => match form.scope.as_deref().map(str::trim) {
            Some(scope) if !scope.is_empty() => {
                let scopes: Vec<String> = scope.split_whitespace().map(String::from).collect();
                challenge.grant_access_to_scopes(&scopes).await?
            }
            _ => challenge.grant_access_to_all().await?,
        },
        "deny" => challenge.refuse_access()?,
        other => {
            warn!(decision = %other, "Unknown consent decision");
            return Err(IdpError::BadRequest);
        }
    };

    if let Some(session_id) = session_id.as_deref() {
        challenge.delete(session_id).await?;
    }

    let expired = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE_NAME);

    Ok((
        StatusCode::FOUND,
        [(LOCATION, location), (SET_COOKIE, expired)],
    )
        .into_response())
}

/// Value of the session cookie, if the request carries one.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
