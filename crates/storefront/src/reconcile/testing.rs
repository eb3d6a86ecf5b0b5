//! In-memory service fakes for reconciliation tests.
//!
//! Compiled for unit tests and, behind the `testing` feature, for the
//! integration test crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use larder_core::{
    BuyerIdentity, BuyerIdentityInput, Cart, CartCost, CartCreateInput, CartCustomer, CartId,
    CartLine, CartLineId, CustomerAccessToken, CustomerId, DiscountCode, MerchandiseId, Money,
};
use tokio::sync::RwLock;

use super::services::{
    CartPayload, CartService, IdentityError, IdentityService, ProviderError, ServiceError,
};

/// Customer every fake token resolves to.
pub const FAKE_CUSTOMER_ID: &str = "gid://shopify/Customer/1001";

/// A call received by [`InMemoryCartService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartCall {
    Get(CartId),
    Create(CartCreateInput),
    UpdateBuyerIdentity {
        cart_id: CartId,
        identity: BuyerIdentityInput,
    },
}

/// Build an anonymous cart with `(merchandise id, quantity)` lines.
#[must_use]
pub fn anonymous_cart(id: &str, lines: &[(&str, i64)]) -> Cart {
    let lines: Vec<CartLine> = lines
        .iter()
        .enumerate()
        .map(|(i, (merchandise, quantity))| CartLine {
            id: CartLineId::new(format!("{id}/line-{i}")),
            merchandise_id: MerchandiseId::new(*merchandise),
            quantity: *quantity,
            attributes: std::collections::BTreeMap::new(),
            title: (*merchandise).to_string(),
            variant_title: None,
        })
        .collect();

    Cart {
        id: CartId::new(id),
        checkout_url: format!("https://checkout.example/cart/{id}"),
        total_quantity: lines.iter().map(|l| l.quantity).sum(),
        lines,
        buyer_identity: BuyerIdentity::default(),
        discount_codes: vec![],
        cost: CartCost {
            subtotal: Money::zero("USD"),
            total: Money::zero("USD"),
        },
    }
}

/// Build a cart already bound to [`FAKE_CUSTOMER_ID`].
#[must_use]
pub fn associated_cart(id: &str, lines: &[(&str, i64)]) -> Cart {
    let mut cart = anonymous_cart(id, lines);
    cart.buyer_identity.customer = Some(fake_customer());
    cart
}

fn fake_customer() -> CartCustomer {
    CartCustomer {
        id: CustomerId::new(FAKE_CUSTOMER_ID),
        email: Some("customer@example.com".to_string()),
    }
}

// =============================================================================
// InMemoryCartService
// =============================================================================

/// Cart service that keeps carts in memory and records every call.
#[derive(Default)]
pub struct InMemoryCartService {
    carts: RwLock<HashMap<CartId, Cart>>,
    calls: RwLock<Vec<CartCall>>,
    next_id: AtomicUsize,
    unavailable: RwLock<bool>,
    latency: RwLock<Option<Duration>>,
    ignore_buyer_identity: RwLock<bool>,
    next_create_errors: RwLock<Option<Vec<ProviderError>>>,
    next_identity_errors: RwLock<Option<Vec<ProviderError>>>,
    create_line_limit: RwLock<Option<usize>>,
}

impl InMemoryCartService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a cart as if the provider already had it.
    pub async fn insert(&self, cart: Cart) {
        self.carts.write().await.insert(cart.id.clone(), cart);
    }

    /// Forget a cart, as the provider does once checkout completes.
    pub async fn remove(&self, cart_id: &CartId) {
        self.carts.write().await.remove(cart_id);
    }

    /// Current provider state of a cart.
    pub async fn cart(&self, cart_id: &CartId) -> Option<Cart> {
        self.carts.read().await.get(cart_id).cloned()
    }

    /// Every call received so far.
    pub async fn calls(&self) -> Vec<CartCall> {
        self.calls.read().await.clone()
    }

    /// Inputs of every create call.
    pub async fn create_calls(&self) -> Vec<CartCreateInput> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|c| match c {
                CartCall::Create(input) => Some(input.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of calls of any kind.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Fail every call with a transport error.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    /// Delay every call.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    /// Accept buyer identities without binding a customer, like a provider
    /// that silently drops the association.
    pub async fn set_ignore_buyer_identity(&self, ignore: bool) {
        *self.ignore_buyer_identity.write().await = ignore;
    }

    /// Keep at most `limit` lines on created carts, like a copy that only
    /// saw the first page of lines.
    pub async fn set_create_line_limit(&self, limit: Option<usize>) {
        *self.create_line_limit.write().await = limit;
    }

    /// Answer the next create call with these provider errors.
    pub async fn fail_next_create(&self, errors: Vec<ProviderError>) {
        *self.next_create_errors.write().await = Some(errors);
    }

    /// Answer the next buyer identity update with these provider errors.
    pub async fn fail_next_identity_update(&self, errors: Vec<ProviderError>) {
        *self.next_identity_errors.write().await = Some(errors);
    }

    async fn enter(&self, call: CartCall) -> Result<(), ServiceError> {
        self.calls.write().await.push(call);
        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if *self.unavailable.read().await {
            return Err(ServiceError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    async fn identity_for(&self, input: Option<&BuyerIdentityInput>) -> BuyerIdentity {
        let Some(input) = input else {
            return BuyerIdentity::default();
        };
        let bind = input.customer_access_token.is_some() && !*self.ignore_buyer_identity.read().await;
        BuyerIdentity {
            customer: bind.then(fake_customer),
            email: input.email.clone(),
            country_code: input.country_code.clone(),
        }
    }
}

#[async_trait]
impl CartService for InMemoryCartService {
    async fn get(&self, cart_id: &CartId) -> Result<Option<Cart>, ServiceError> {
        self.enter(CartCall::Get(cart_id.clone())).await?;
        Ok(self.cart(cart_id).await)
    }

    async fn create(&self, input: CartCreateInput) -> Result<CartPayload, ServiceError> {
        self.enter(CartCall::Create(input.clone())).await?;

        if let Some(errors) = self.next_create_errors.write().await.take() {
            return Ok(CartPayload { cart: None, errors });
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("gid://shopify/Cart/mem-{n}");
        let limit = self.create_line_limit.read().await.unwrap_or(usize::MAX);
        let lines: Vec<CartLine> = input
            .lines
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, line)| CartLine {
                id: CartLineId::new(format!("{id}/line-{i}")),
                merchandise_id: line.merchandise_id.clone(),
                quantity: i64::from(line.quantity),
                attributes: line.attributes.clone(),
                title: line.merchandise_id.to_string(),
                variant_title: None,
            })
            .collect();

        let cart = Cart {
            id: CartId::new(id.clone()),
            checkout_url: format!("https://checkout.example/cart/{id}"),
            total_quantity: lines.iter().map(|l| l.quantity).sum(),
            lines,
            buyer_identity: self.identity_for(input.buyer_identity.as_ref()).await,
            discount_codes: input
                .discount_codes
                .iter()
                .map(|code| DiscountCode {
                    code: code.clone(),
                    applicable: true,
                })
                .collect(),
            cost: CartCost {
                subtotal: Money::zero("USD"),
                total: Money::zero("USD"),
            },
        };

        self.insert(cart.clone()).await;
        Ok(CartPayload {
            cart: Some(cart),
            errors: vec![],
        })
    }

    async fn update_buyer_identity(
        &self,
        cart_id: &CartId,
        identity: BuyerIdentityInput,
    ) -> Result<CartPayload, ServiceError> {
        self.enter(CartCall::UpdateBuyerIdentity {
            cart_id: cart_id.clone(),
            identity: identity.clone(),
        })
        .await?;

        if let Some(errors) = self.next_identity_errors.write().await.take() {
            return Ok(CartPayload { cart: None, errors });
        }

        let buyer_identity = self.identity_for(Some(&identity)).await;
        let mut carts = self.carts.write().await;
        let Some(cart) = carts.get_mut(cart_id) else {
            return Ok(CartPayload {
                cart: None,
                errors: vec![ProviderError::message("The specified cart does not exist.")],
            });
        };
        cart.buyer_identity = buyer_identity;

        Ok(CartPayload {
            cart: Some(cart.clone()),
            errors: vec![],
        })
    }
}

// =============================================================================
// StaticIdentity
// =============================================================================

/// Identity service with a fixed login state.
pub struct StaticIdentity {
    logged_in: bool,
    token: Result<CustomerAccessToken, IdentityError>,
    token_calls: AtomicUsize,
}

impl StaticIdentity {
    /// No customer signed in.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            logged_in: false,
            token: Err(IdentityError::NotLoggedIn),
            token_calls: AtomicUsize::new(0),
        }
    }

    /// A signed-in customer holding `token`.
    #[must_use]
    pub const fn logged_in(token: CustomerAccessToken) -> Self {
        Self {
            logged_in: true,
            token: Ok(token),
            token_calls: AtomicUsize::new(0),
        }
    }

    /// A signed-in customer whose token cannot be obtained.
    #[must_use]
    pub const fn failing(error: IdentityError) -> Self {
        Self {
            logged_in: true,
            token: Err(error),
            token_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `access_token` calls made.
    #[must_use]
    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityService for StaticIdentity {
    async fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    async fn access_token(&self) -> Result<CustomerAccessToken, IdentityError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.token.clone()
    }
}
