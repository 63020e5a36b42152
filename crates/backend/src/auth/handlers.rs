//! Authentication HTTP handlers.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::Duration;
use serde::Deserialize;
use shared_types::{
    LoginRequest, LoginResponse, MessageResponse, RegisterRequest, UpdateProfileRequest,
    UserProfile,
};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

use super::middleware::{resolve_access_token, CurrentUser};

/// The provider-state cookie is only sent back to the callback.
pub const OAUTH_STATE_PATH: &str = "/login/oauth2/";
const OAUTH_STATE_SUFFIX: &str = "_oauth_state";
const OAUTH_STATE_TTL_SECS: i64 = 600;
/// The only detail a failed provider login ever reveals.
pub const OAUTH_FAILURE_MESSAGE: &str = "OAuth2 authentication failed";

/// Log in with email and password. Sets both session cookies.
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body?;
    let session = state
        .sessions
        .login(&request.email_address, &request.password)
        .await?;

    let mut response = Json(LoginResponse {
        user: session.identity.profile(),
        message: "Login successful".to_string(),
    })
    .into_response();
    state.sessions.write_session(&mut response, &session);
    Ok(response)
}

/// Trade the refresh cookie for a new access cookie.
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let refresh_token = state.sessions.cookies().read_refresh(&headers);
    let access_token = state.sessions.refresh(refresh_token.as_deref()).await?;

    let mut response = Json(MessageResponse::new("Token refreshed successfully")).into_response();
    state
        .sessions
        .cookies()
        .write_access(&mut response, &access_token);
    Ok(response)
}

/// Logout - clear both cookies. Always succeeds.
pub async fn logout(State(state): State<AppState>) -> Response {
    let mut response = Json(MessageResponse::new("Logged out successfully")).into_response();
    state.sessions.logout(&mut response);
    response
}

/// Get current authenticated user info from the access cookie.
pub async fn current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<UserProfile>> {
    let token = state
        .sessions
        .cookies()
        .read_access(&headers)
        .ok_or_else(|| ApiError::unauthenticated("No valid token found"))?;
    let context = resolve_access_token(&state, &token).await?;
    let identity = state.sessions.current_identity(&context).await?;
    Ok(Json(identity.profile()))
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(request) = body?;
    state.sessions.register(request).await?;
    Ok(Json(MessageResponse::new(
        "User registered successfully. Please check your email to verify your account.",
    )))
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    pub token: String,
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> ApiResult<Json<MessageResponse>> {
    state.sessions.verify_email(&params.token).await?;
    Ok(Json(MessageResponse::new(
        "Email verified successfully. You can now log in.",
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendParams {
    pub email_address: String,
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Query(params): Query<ResendParams>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .sessions
        .resend_verification(&params.email_address)
        .await?;
    Ok(Json(MessageResponse::new("Verification email sent")))
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(context): CurrentUser,
    body: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> ApiResult<Json<UserProfile>> {
    let Json(request) = body?;
    let identity = state.sessions.update_profile(&context, request).await?;
    Ok(Json(identity.profile()))
}

/// Delete the caller's account and end the session.
pub async fn delete_account(
    State(state): State<AppState>,
    CurrentUser(context): CurrentUser,
) -> ApiResult<Response> {
    state.sessions.delete_account(&context).await?;

    let mut response = Json(MessageResponse::new("Account deleted successfully")).into_response();
    state.sessions.logout(&mut response);
    Ok(response)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "UP" }))
}

/// Start the provider login: remember a random state, send the browser off.
pub async fn oauth_start(State(state): State<AppState>) -> Response {
    let Some(provider) = state.provider.as_ref() else {
        tracing::error!("Provider login requested but no identity provider is configured");
        return oauth_failure(&state);
    };

    let csrf_state = uuid::Uuid::new_v4().to_string();
    let mut response = Redirect::to(&provider.authorization_url(&csrf_state)).into_response();
    state.sessions.cookies().write(
        &mut response,
        &oauth_state_cookie(&state),
        &csrf_state,
        Duration::seconds(OAUTH_STATE_TTL_SECS),
        OAUTH_STATE_PATH,
    );
    response
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Finish the provider login.
///
/// Every failure becomes a redirect to the failure destination carrying a
/// fixed message; the cause is only logged.
pub async fn oauth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<OAuthCallbackParams>,
) -> Response {
    let mut response = match handle_callback_inner(&state, &headers, params).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("OAuth callback error: {:?}", e);
            oauth_failure(&state)
        }
    };
    state
        .sessions
        .cookies()
        .clear(&mut response, &oauth_state_cookie(&state), OAUTH_STATE_PATH);
    response
}

async fn handle_callback_inner(
    state: &AppState,
    headers: &HeaderMap,
    params: OAuthCallbackParams,
) -> Result<Response, ApiError> {
    if let Some(error) = params.error {
        return Err(ApiError::bad_request(format!("provider returned error: {}", error)));
    }
    let provider = state
        .provider
        .as_ref()
        .ok_or_else(|| ApiError::Config("no identity provider configured".to_string()))?;

    let expected = crate::auth::cookies::read_cookie(headers, &oauth_state_cookie(state))
        .ok_or_else(|| ApiError::bad_request("missing OAuth state cookie"))?;
    if params.state.as_deref() != Some(expected.as_str()) {
        return Err(ApiError::bad_request("OAuth state mismatch"));
    }
    let code = params
        .code
        .ok_or_else(|| ApiError::bad_request("missing authorization code"))?;

    let profile = provider.exchange(&code).await?;
    tracing::info!(
        "OAuth login attempt from: {}",
        profile.email.as_deref().unwrap_or("<no email>")
    );

    let session = state.sessions.complete_provider_login(profile).await?;

    let target = with_query(
        &state.config.oauth.authorized_redirect_uri,
        "userId",
        &session.identity.id.to_string(),
    );
    let mut response = Redirect::to(&target).into_response();
    state.sessions.write_session(&mut response, &session);
    Ok(response)
}

fn oauth_failure(state: &AppState) -> Response {
    let target = with_query(
        &state.config.oauth.failure_redirect_uri,
        "error",
        OAUTH_FAILURE_MESSAGE,
    );
    Redirect::to(&target).into_response()
}

fn oauth_state_cookie(state: &AppState) -> String {
    format!("{}{}", state.config.cookie.name, OAUTH_STATE_SUFFIX)
}

fn with_query(base: &str, key: &str, value: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", base, separator, key, urlencoding::encode(value))
}
