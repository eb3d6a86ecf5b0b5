//! Shopify Customer session extractor and helpers.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::models::session_keys;
use crate::shopify::CustomerTokens;

/// Extractor that optionally gets the Shopify customer's tokens.
///
/// Never rejects: guests get `None`. The tokens may be expired; cart
/// reconciliation refreshes them through `SessionIdentity` when needed.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(
///     OptionalShopifyCustomer(tokens): OptionalShopifyCustomer,
/// ) -> impl IntoResponse {
///     match tokens {
///         Some(_) => "Customer signed in",
///         None => "Guest visitor",
///     }
/// }
/// ```
pub struct OptionalShopifyCustomer(pub Option<CustomerTokens>);

impl<S> FromRequestParts<S> for OptionalShopifyCustomer
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tokens = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<CustomerTokens>(session_keys::SHOPIFY_CUSTOMER_TOKEN)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        Ok(Self(tokens))
    }
}

/// Store the Shopify customer's tokens in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_shopify_customer_tokens(
    session: &Session,
    tokens: &CustomerTokens,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(session_keys::SHOPIFY_CUSTOMER_TOKEN, tokens)
        .await
}

/// Remove the Shopify customer's tokens from the session, returning them.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_shopify_customer_tokens(
    session: &Session,
) -> Result<Option<CustomerTokens>, tower_sessions::session::Error> {
    session
        .remove::<CustomerTokens>(session_keys::SHOPIFY_CUSTOMER_TOKEN)
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    fn tokens() -> CustomerTokens {
        CustomerTokens {
            access_token: "shcat_abc123".to_string(),
            id_token: Some("id".to_string()),
            refresh_token: None,
            expires_in: Some(3600),
            obtained_at: chrono::Utc::now().timestamp(),
        }
    }

    #[tokio::test]
    async fn test_set_and_clear_tokens() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        set_shopify_customer_tokens(&session, &tokens()).await.unwrap();
        let cleared = clear_shopify_customer_tokens(&session).await.unwrap();

        assert_eq!(cleared.unwrap().id_token.as_deref(), Some("id"));
        assert!(clear_shopify_customer_tokens(&session).await.unwrap().is_none());
    }
}
