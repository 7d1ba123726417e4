//! REST client for the remote cart service.
//!
//! One shared `reqwest::Client` behind an `Arc` inner, with a fixed
//! transport timeout for backend calls. Unsafe requests carry an
//! anti-forgery token fetched from the token endpoint; the token and
//! session retry discipline is documented on [`crate::api`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use tableside_core::{CartItemId, StoreLocationId};

use crate::api::{ApiError, CartApi};
use crate::config::CheckoutConfig;
use crate::session::{GuestSession, SessionContext};
use crate::types::{
    Cart, CompletePaymentRequest, GuestContact, NewCartItem, Order, OrderEnvelope, PaymentIntent,
    PaymentIntentRequest,
};

const CSRF_HEADER: &str = "X-CSRF-Token";
const CSRF_TOKEN_PATH: &str = "/api/csrf-token";
const SESSION_REFRESH_PATH: &str = "/api/session/refresh";

/// Client for the remote cart service REST API.
#[derive(Clone)]
pub struct RestCartClient {
    inner: Arc<RestCartClientInner>,
}

struct RestCartClientInner {
    http: reqwest::Client,
    base_url: String,
    csrf_token: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct CsrfToken {
    token: String,
}

impl RestCartClient {
    /// Create a new cart service client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &CheckoutConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            inner: Arc::new(RestCartClientInner {
                http,
                base_url: config.api_base_url.trim_end_matches('/').to_string(),
                csrf_token: Mutex::new(None),
            }),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.inner.base_url)
    }

    fn cached_csrf(&self) -> Option<String> {
        self.inner
            .csrf_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_csrf(&self, token: String) {
        *self
            .inner
            .csrf_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Fetch an anti-forgery token, reusing the cached one unless `force`.
    ///
    /// The token is fetched lazily on the first unsafe request and then
    /// cached for the client's lifetime rather than refetched per request:
    /// the backend only rotates it when the session rotates, which shows up
    /// as a 403 and triggers the single forced refresh in [`Self::request`].
    async fn csrf_token(&self, force: bool) -> Result<String, ApiError> {
        if !force && let Some(token) = self.cached_csrf() {
            return Ok(token);
        }

        let response = self
            .inner
            .http
            .get(self.endpoint(CSRF_TOKEN_PATH))
            .send()
            .await?;
        let token: CsrfToken = Self::decode(response, CSRF_TOKEN_PATH).await?;
        self.store_csrf(token.token.clone());
        Ok(token.token)
    }

    /// Refresh the server-side session after a 401.
    ///
    /// A failure here is the logout signal: there is nothing left to retry.
    async fn refresh_session(&self, ctx: Option<&SessionContext>) -> Result<(), ApiError> {
        let mut request = self.inner.http.post(self.endpoint(SESSION_REFRESH_PATH));
        if let Some(token) = ctx.and_then(SessionContext::bearer_token) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|_| ApiError::LoggedOut)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::LoggedOut)
        }
    }

    async fn send_raw(
        &self,
        ctx: Option<&SessionContext>,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        csrf: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self.inner.http.request(method.clone(), self.endpoint(path));
        if let Some(token) = ctx.and_then(SessionContext::bearer_token) {
            request = request.bearer_auth(token);
        }
        if let Some(token) = csrf {
            request = request.header(CSRF_HEADER, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Execute a request with the bounded retry discipline.
    ///
    /// At most one anti-forgery refresh (on 403) and at most one session
    /// refresh (on 401) - never more, so a persistently broken session
    /// cannot loop.
    async fn request<T: DeserializeOwned>(
        &self,
        ctx: Option<&SessionContext>,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let needs_csrf = method != Method::GET;
        let mut csrf = if needs_csrf {
            Some(self.csrf_token(false).await?)
        } else {
            None
        };

        let mut response = self
            .send_raw(ctx, &method, path, body.as_ref(), csrf.as_deref())
            .await?;

        if needs_csrf && response.status() == StatusCode::FORBIDDEN {
            debug!(path, "anti-forgery token rejected, refreshing once");
            csrf = Some(self.csrf_token(true).await?);
            response = self
                .send_raw(ctx, &method, path, body.as_ref(), csrf.as_deref())
                .await?;
        }

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(path, "unauthorized, refreshing session once");
            self.refresh_session(ctx).await?;
            response = self
                .send_raw(ctx, &method, path, body.as_ref(), csrf.as_deref())
                .await?;
        }

        Self::decode(response, path).await
    }

    /// Decode a response, mapping non-success statuses to [`ApiError`].
    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        path: &str,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| {
                tracing::error!(
                    error = %e,
                    path,
                    body = %text.chars().take(500).collect::<String>(),
                    "Failed to parse cart service response"
                );
                ApiError::Parse(e)
            });
        }

        let message = extract_message(&text)
            .unwrap_or_else(|| text.chars().take(200).collect::<String>());

        Err(match status {
            StatusCode::NOT_FOUND => ApiError::NotFound(format!("{path}: {message}")),
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
            StatusCode::FORBIDDEN => ApiError::Forbidden(message),
            s if s.is_client_error() => ApiError::Business(message),
            s => {
                tracing::error!(
                    status = %s,
                    path,
                    body = %text.chars().take(500).collect::<String>(),
                    "Cart service returned non-success status"
                );
                ApiError::Server(message)
            }
        })
    }
}

/// Pull the `message` field out of an error body, if the backend sent one.
fn extract_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

impl CartApi for RestCartClient {
    #[instrument(skip(self, ctx), fields(session = %ctx.key().as_str()))]
    async fn fetch_cart(&self, ctx: &SessionContext) -> Result<Cart, ApiError> {
        match self
            .request::<Cart>(Some(ctx), Method::GET, "/api/cart", None)
            .await
        {
            Ok(cart) => Ok(cart),
            // No cart yet is a normal state, not an error.
            Err(ApiError::NotFound(_)) => Ok(Cart::empty()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, ctx, item), fields(product_id = %item.product_id))]
    async fn add_item(&self, ctx: &SessionContext, item: &NewCartItem) -> Result<Cart, ApiError> {
        let body = serde_json::to_value(item)?;
        self.request(Some(ctx), Method::POST, "/api/cart/items", Some(body))
            .await
    }

    #[instrument(skip(self, ctx), fields(item_id = %item_id, quantity))]
    async fn update_item(
        &self,
        ctx: &SessionContext,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<Cart, ApiError> {
        let body = serde_json::json!({ "quantity": quantity });
        self.request(
            Some(ctx),
            Method::PATCH,
            &format!("/api/cart/items/{item_id}"),
            Some(body),
        )
        .await
    }

    #[instrument(skip(self, ctx), fields(item_id = %item_id))]
    async fn remove_item(
        &self,
        ctx: &SessionContext,
        item_id: CartItemId,
    ) -> Result<Cart, ApiError> {
        self.request(
            Some(ctx),
            Method::DELETE,
            &format!("/api/cart/items/{item_id}"),
            None,
        )
        .await
    }

    #[instrument(skip(self, ctx))]
    async fn clear_cart(&self, ctx: &SessionContext) -> Result<Cart, ApiError> {
        self.request(Some(ctx), Method::DELETE, "/api/cart", None)
            .await
    }

    #[instrument(skip(self, ctx), fields(location_id = %location_id))]
    async fn set_location(
        &self,
        ctx: &SessionContext,
        location_id: StoreLocationId,
    ) -> Result<Cart, ApiError> {
        let body = serde_json::json!({ "store_location_id": location_id });
        self.request(Some(ctx), Method::POST, "/api/cart/location", Some(body))
            .await
    }

    #[instrument(skip(self, ctx, contact))]
    async fn set_customer_info(
        &self,
        ctx: &SessionContext,
        contact: &GuestContact,
    ) -> Result<Cart, ApiError> {
        let body = serde_json::to_value(contact)?;
        self.request(Some(ctx), Method::PATCH, "/api/cart/customer", Some(body))
            .await
    }

    #[instrument(skip(self))]
    async fn init_guest_session(&self) -> Result<GuestSession, ApiError> {
        self.request(None, Method::POST, "/api/session/guest", None)
            .await
    }

    #[instrument(skip(self, ctx, request))]
    async fn create_payment_intent(
        &self,
        ctx: &SessionContext,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ApiError> {
        let body = serde_json::to_value(request)?;
        self.request(
            Some(ctx),
            Method::POST,
            "/api/checkout/payment-intent",
            Some(body),
        )
        .await
    }

    #[instrument(skip(self, ctx, request), fields(payment_intent_id = %request.payment_intent_id))]
    async fn complete_payment(
        &self,
        ctx: &SessionContext,
        request: &CompletePaymentRequest,
    ) -> Result<Order, ApiError> {
        let body = serde_json::to_value(request)?;
        let envelope: OrderEnvelope = self
            .request(Some(ctx), Method::POST, "/api/checkout/complete", Some(body))
            .await?;
        Ok(envelope.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_message() {
        assert_eq!(
            extract_message(r#"{"message":"Only 2 items available"}"#),
            Some("Only 2 items available".to_string())
        );
        assert_eq!(extract_message("not json"), None);
        assert_eq!(extract_message(r#"{"error":"nope"}"#), None);
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = CheckoutConfig {
            api_base_url: "https://orders.example.com/".to_string(),
            ..CheckoutConfig::for_tests()
        };
        let client = RestCartClient::new(&config).expect("client");
        assert_eq!(
            client.endpoint("/api/cart"),
            "https://orders.example.com/api/cart"
        );
    }
}
