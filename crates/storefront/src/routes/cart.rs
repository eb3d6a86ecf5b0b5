//! Cart route handlers.
//!
//! Cart IDs are stored in the session and mapped to Shopify carts. Every
//! handler loads a [`CartContext`] from the session and commits it back
//! explicitly, so a failed reconciliation never leaves a half-written
//! cart reference behind.

use std::collections::BTreeMap;
use std::future::Future;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use larder_core::{
    BuyerIdentityInput, Cart, CartCreateInput, CartId, CartLineId, CartLineInput,
    ReconciliationResult,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::models::{
    commit_cart_context, load_cart_context, mark_checkout_started, take_checkout_marker,
};
use crate::reconcile::timeout::bounded;
use crate::reconcile::{CartContext, DisplayedCart, RefreshOutcome, RequestMetadata};
use crate::shopify::{CartLineUpdate, FetchPolicy};
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Add to cart request body.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub variant_id: String,
    pub quantity: Option<u32>,
    /// Line attributes such as bundle provenance.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Update cart request body.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub line_id: String,
    pub quantity: u32,
}

/// Remove from cart request body.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub line_id: String,
}

/// Cart snapshot response.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart: Option<Cart>,
    /// Whether a checkout-return resync ran for this request.
    pub refreshed: bool,
}

/// Cart count response.
#[derive(Debug, Serialize)]
pub struct CartCountResponse {
    pub count: i64,
}

/// Passive sync check response.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub refreshed: bool,
    /// Set when the cart was converted into an order and is gone.
    pub cart_gone: bool,
    pub result: Option<ReconciliationResult>,
    /// Last known cart when the refresh could not produce one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart: Option<Cart>,
}

// =============================================================================
// Helpers
// =============================================================================

fn request_metadata(headers: &HeaderMap) -> RequestMetadata {
    RequestMetadata {
        referer: headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
    }
}

/// Mark a response as uncacheable.
fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Run the passive checkout-return check and persist any cart change.
async fn detect_and_refresh(
    state: &AppState,
    session: &Session,
    headers: &HeaderMap,
    ctx: &mut CartContext,
) -> Result<RefreshOutcome> {
    let mut marker = take_checkout_marker(session).await;
    let outcome = state
        .checkout_return(session)
        .detect_and_refresh(ctx, &request_metadata(headers), &mut marker, Utc::now())
        .await;
    commit_cart_context(session, ctx).await?;
    Ok(outcome)
}

/// Buyer identity for new carts when the customer is signed in.
async fn buyer_identity(state: &AppState, session: &Session) -> Option<BuyerIdentityInput> {
    let identity = state.identity(session);
    if !identity.is_logged_in().await {
        return None;
    }
    let limit = state.config().reconcile.call_timeout;
    match bounded(limit, "identity.access_token", identity.access_token()).await {
        Ok(token) => Some(BuyerIdentityInput::for_customer(token)),
        Err(e) => {
            tracing::warn!(error = %e, "Creating anonymous cart, customer token unavailable");
            None
        }
    }
}

/// The cart to render after a refresh check.
///
/// `cached` runs only when the check produced nothing to show, so a failed
/// refresh falls back to the regular read instead of an empty cart.
async fn settle_displayed_cart<F, Fut>(outcome: &RefreshOutcome, cached: F) -> Option<Cart>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Option<Cart>>,
{
    match outcome.displayed_cart() {
        DisplayedCart::Fresh(cart) => Some(cart),
        DisplayedCart::Gone => None,
        DisplayedCart::Cached => cached().await,
    }
}

/// Cached read of the session's cart, logging failures.
async fn cached_cart(state: &AppState, ctx: &CartContext) -> Option<Cart> {
    let cart_id = ctx.cart_id()?;
    state
        .storefront()
        .get_cart(cart_id, FetchPolicy::CacheFirst)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to fetch cart");
            None
        })
}

async fn require_cart_id(session: &Session) -> Result<CartId> {
    load_cart_context(session)
        .await
        .cart_id()
        .cloned()
        .ok_or_else(|| AppError::NotFound("cart".to_string()))
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the cart.
///
/// Runs the checkout-return check first so a customer coming back from
/// checkout never sees stale lines.
#[instrument(skip_all)]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
) -> Result<Response> {
    let mut ctx = load_cart_context(&session).await;
    let outcome = detect_and_refresh(&state, &session, &headers, &mut ctx).await?;
    let refreshed = outcome.was_forced();

    let cart = settle_displayed_cart(&outcome, || cached_cart(&state, &ctx)).await;

    let response = Json(CartResponse { cart, refreshed }).into_response();
    Ok(if refreshed { no_store(response) } else { response })
}

/// Add an item to the cart.
///
/// Creates a new cart if one doesn't exist, associated with the customer
/// when they are signed in.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<AddToCartRequest>,
) -> Result<Json<CartResponse>> {
    let quantity = request.quantity.unwrap_or(1);
    if quantity == 0 {
        return Err(AppError::BadRequest("quantity must be at least 1".to_string()));
    }
    let mut line = CartLineInput::new(request.variant_id, quantity);
    line.attributes = request.attributes;

    let mut ctx = load_cart_context(&session).await;
    let mutation = match ctx.cart_id() {
        Some(cart_id) => state.storefront().add_to_cart(cart_id, vec![line]).await?,
        None => {
            let input = CartCreateInput {
                lines: vec![line],
                buyer_identity: buyer_identity(&state, &session).await,
                ..CartCreateInput::default()
            };
            state.storefront().create_cart(input).await?
        }
    };
    let cart = mutation.into_cart("add to cart")?;

    ctx.replace(cart.id.clone());
    commit_cart_context(&session, &ctx).await?;

    Ok(Json(CartResponse {
        cart: Some(cart),
        refreshed: false,
    }))
}

/// Update a cart line's quantity.
#[instrument(skip(state, session))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<UpdateCartRequest>,
) -> Result<Json<CartResponse>> {
    let cart_id = require_cart_id(&session).await?;

    let update = CartLineUpdate {
        id: CartLineId::new(request.line_id),
        quantity: request.quantity,
    };
    let cart = state
        .storefront()
        .update_cart_lines(&cart_id, vec![update])
        .await?
        .into_cart("update cart")?;

    Ok(Json(CartResponse {
        cart: Some(cart),
        refreshed: false,
    }))
}

/// Remove a line from the cart.
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<RemoveFromCartRequest>,
) -> Result<Json<CartResponse>> {
    let cart_id = require_cart_id(&session).await?;

    let cart = state
        .storefront()
        .remove_from_cart(&cart_id, vec![CartLineId::new(request.line_id)])
        .await?
        .into_cart("remove from cart")?;

    Ok(Json(CartResponse {
        cart: Some(cart),
        refreshed: false,
    }))
}

/// Get the cart item count.
#[instrument(skip_all)]
pub async fn count(State(state): State<AppState>, session: Session) -> Json<CartCountResponse> {
    let ctx = load_cart_context(&session).await;
    let count = match ctx.cart_id() {
        Some(cart_id) => state
            .storefront()
            .get_cart(cart_id, FetchPolicy::CacheFirst)
            .await
            .ok()
            .flatten()
            .map_or(0, |cart| cart.total_quantity),
        None => 0,
    };

    Json(CartCountResponse { count })
}

/// Redirect to Shopify checkout.
///
/// Records the checkout-started marker so the next page load resyncs the
/// cart even when the browser sends no referrer.
#[instrument(skip_all)]
pub async fn checkout(State(state): State<AppState>, session: Session) -> Result<Response> {
    let ctx = load_cart_context(&session).await;
    let Some(cart_id) = ctx.cart_id() else {
        return Ok(Redirect::to("/cart").into_response());
    };

    let cart = match state
        .storefront()
        .get_cart(cart_id, FetchPolicy::BypassCache)
        .await
    {
        Ok(Some(cart)) if !cart.is_empty() => cart,
        Ok(_) => return Ok(Redirect::to("/cart").into_response()),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get cart for checkout");
            return Ok(Redirect::to("/cart").into_response());
        }
    };

    mark_checkout_started(&session, Utc::now()).await?;
    Ok(Redirect::to(&cart.checkout_url).into_response())
}

/// Merge the session cart with the signed-in customer now.
///
/// The synchronous counterpart of the background merge spawned at login.
#[instrument(skip_all)]
pub async fn merge(State(state): State<AppState>, session: Session) -> Result<Response> {
    let mut ctx = load_cart_context(&session).await;
    let result = state.merge_coordinator(&session).merge_on_login(&mut ctx).await;
    commit_cart_context(&session, &ctx).await?;

    Ok(no_store(Json(result).into_response()))
}

/// Passive checkout-return check for client-side polling.
#[instrument(skip_all)]
pub async fn sync(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
) -> Result<Response> {
    let mut ctx = load_cart_context(&session).await;
    let outcome = detect_and_refresh(&state, &session, &headers, &mut ctx).await?;
    let refreshed = outcome.was_forced();

    let body = match outcome {
        RefreshOutcome::Skipped => SyncResponse {
            refreshed,
            cart_gone: false,
            result: None,
            cart: None,
        },
        RefreshOutcome::CartGone => SyncResponse {
            refreshed,
            cart_gone: true,
            result: None,
            cart: None,
        },
        RefreshOutcome::Reconciled(result) => {
            let cart = match result.cart() {
                Some(_) => None,
                None => cached_cart(&state, &ctx).await,
            };
            SyncResponse {
                refreshed,
                cart_gone: false,
                result: Some(result),
                cart,
            }
        }
    };

    let response = Json(body).into_response();
    Ok(if refreshed { no_store(response) } else { response })
}
