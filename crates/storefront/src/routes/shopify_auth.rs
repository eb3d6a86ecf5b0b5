//! Shopify Customer Account OAuth route handlers.
//!
//! Handles the OAuth flow for Shopify Customer Account authentication:
//! - Login: Redirects to Shopify's OAuth authorization page
//! - Callback: Exchanges the code for tokens and starts the background cart merge
//! - Logout: Clears the customer's tokens and cart, then redirects to Shopify logout

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use rand::{Rng, distr::Alphanumeric};
use serde::Deserialize;
use tower_sessions::Session;

use crate::middleware::{clear_shopify_customer_tokens, set_shopify_customer_tokens};
use crate::models::{commit_cart_context, load_cart_context, session_keys};
use crate::state::AppState;

/// Query parameters from Shopify OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code to exchange for tokens.
    pub code: Option<String>,
    /// State parameter for CSRF protection.
    pub state: Option<String>,
    /// Error code if authorization failed.
    pub error: Option<String>,
    /// Error description.
    pub error_description: Option<String>,
}

/// Generate a cryptographically secure random string.
fn generate_random_string(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn login_error(code: &str) -> Response {
    Redirect::to(&format!("/?login_error={code}")).into_response()
}

/// Initiate Shopify Customer Account OAuth login.
///
/// Generates state and nonce parameters, stores them in the session,
/// and redirects to Shopify's authorization page.
///
/// # Route
///
/// `GET /auth/shopify/login`
pub async fn login(State(state): State<AppState>, session: Session) -> Response {
    // Generate CSRF state and OpenID nonce
    let oauth_state = generate_random_string(32);
    let nonce = generate_random_string(32);

    if let Err(e) = session
        .insert(session_keys::SHOPIFY_OAUTH_STATE, &oauth_state)
        .await
    {
        tracing::error!("Failed to store OAuth state in session: {}", e);
        return login_error("session");
    }

    if let Err(e) = session
        .insert(session_keys::SHOPIFY_OAUTH_NONCE, &nonce)
        .await
    {
        tracing::error!("Failed to store OAuth nonce in session: {}", e);
        return login_error("session");
    }

    let redirect_uri = format!("{}/auth/shopify/callback", state.config().base_url);
    let auth_url = state
        .customer()
        .authorization_url(&redirect_uri, &oauth_state, &nonce);

    Redirect::to(&auth_url).into_response()
}

/// Handle Shopify OAuth callback.
///
/// Validates the state parameter, exchanges the authorization code for
/// tokens and stores them in the session. The guest cart is merged into the
/// customer's identity in the background so the redirect is not held up by
/// Shopify.
///
/// # Route
///
/// `GET /auth/shopify/callback`
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        tracing::warn!("Shopify OAuth error: {} - {}", error, description);
        return login_error("shopify_denied");
    }

    let Some(code) = query.code else {
        tracing::warn!("Shopify OAuth callback missing code");
        return login_error("missing_code");
    };

    let Some(returned_state) = query.state else {
        tracing::warn!("Shopify OAuth callback missing state");
        return login_error("missing_state");
    };

    let stored_state: Option<String> = session
        .get(session_keys::SHOPIFY_OAUTH_STATE)
        .await
        .ok()
        .flatten();

    if stored_state.as_ref() != Some(&returned_state) {
        tracing::warn!("Shopify OAuth state mismatch");
        return login_error("invalid_state");
    }

    // One-time use
    let _ = session
        .remove::<String>(session_keys::SHOPIFY_OAUTH_STATE)
        .await;
    let _ = session
        .remove::<String>(session_keys::SHOPIFY_OAUTH_NONCE)
        .await;

    // Must match the one used in the authorization request
    let redirect_uri = format!("{}/auth/shopify/callback", state.config().base_url);

    let tokens = match state.customer().exchange_code(&code, &redirect_uri).await {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::error!("Failed to exchange Shopify OAuth code: {}", e);
            return login_error("token_exchange");
        }
    };

    if let Err(e) = set_shopify_customer_tokens(&session, &tokens).await {
        tracing::error!("Failed to store Shopify customer tokens: {}", e);
        return login_error("session");
    }

    tracing::info!("Shopify customer authenticated successfully");

    let coordinator = state.merge_coordinator(&session);
    let merge_session = session.clone();
    state.supervisor().spawn("login", move || async move {
        let mut ctx = load_cart_context(&merge_session).await;
        let result = coordinator.merge_on_login(&mut ctx).await;

        // The response has already been sent, so persist explicitly.
        if let Err(e) = commit_cart_context(&merge_session, &ctx).await {
            tracing::warn!(error = %e, "Failed to record merged cart in session");
        } else if let Err(e) = merge_session.save().await {
            tracing::warn!(error = %e, "Failed to save session after login merge");
        }

        result
    });

    Redirect::to("/cart").into_response()
}

/// Logout from Shopify Customer Account.
///
/// Clears the customer's tokens and cart reference (the cart now belongs to
/// the customer account), then redirects to Shopify's logout endpoint when
/// an ID token is available.
///
/// # Route
///
/// `POST /auth/shopify/logout`
pub async fn logout(State(state): State<AppState>, session: Session) -> Response {
    let tokens = clear_shopify_customer_tokens(&session).await.ok().flatten();

    let mut ctx = load_cart_context(&session).await;
    ctx.clear();
    if let Err(e) = commit_cart_context(&session, &ctx).await {
        tracing::warn!(error = %e, "Failed to clear cart reference on logout");
    }

    if let Some(id_token) = tokens.and_then(|t| t.id_token) {
        let post_logout_uri = format!("{}/", state.config().base_url);
        let logout_url = state.customer().logout_url(&id_token, &post_logout_uri);
        return Redirect::to(&logout_url).into_response();
    }

    Redirect::to("/").into_response()
}
