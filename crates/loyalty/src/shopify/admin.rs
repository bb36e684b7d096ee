//! Shopify Admin API GraphQL client.
//!
//! Thin executor over `reqwest`: one endpoint, one access token, inline
//! GraphQL documents. Transient failures (transport errors, 5xx, 429) are
//! retried with bounded backoff; user errors and auth failures are not.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use crate::config::ShopifyAdminConfig;

use super::AdminError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Extra attempts after the first failure of a transient kind.
const MAX_RETRIES: u32 = 2;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
/// Cap on honoring Retry-After so a hostile header cannot stall a webhook.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(5);

const CUSTOMER_METAFIELD_QUERY: &str = r"
query CustomerMetafield($id: ID!, $namespace: String!, $key: String!) {
  customer(id: $id) {
    id
    metafield(namespace: $namespace, key: $key) {
      value
    }
  }
}
";

const ORDER_METAFIELD_QUERY: &str = r"
query OrderMetafield($id: ID!, $namespace: String!, $key: String!) {
  order(id: $id) {
    id
    metafield(namespace: $namespace, key: $key) {
      value
    }
  }
}
";

const CUSTOMER_UPDATE_MUTATION: &str = r"
mutation SetCustomerMetafields($input: CustomerInput!) {
  customerUpdate(input: $input) {
    customer {
      id
    }
    userErrors {
      field
      message
    }
  }
}
";

const ORDER_UPDATE_MUTATION: &str = r"
mutation SetOrderMetafields($input: OrderInput!) {
  orderUpdate(input: $input) {
    order {
      id
    }
    userErrors {
      field
      message
    }
  }
}
";

/// The kind of entity a metafield is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetafieldOwner {
    Customer,
    Order,
}

/// One metafield in a `customerUpdate` / `orderUpdate` mutation.
#[derive(Debug, Clone, Serialize)]
pub struct MetafieldInput {
    pub namespace: String,
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: String,
}

impl MetafieldInput {
    /// An integer-typed metafield.
    #[must_use]
    pub fn integer(namespace: &str, key: &str, value: u64) -> Self {
        Self {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            value_type: "number_integer".to_string(),
        }
    }

    /// A JSON-typed metafield.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn structured<T: Serialize>(
        namespace: &str,
        key: &str,
        value: &T,
    ) -> Result<Self, AdminError> {
        Ok(Self {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: serde_json::to_string(value)?,
            value_type: "json".to_string(),
        })
    }
}

/// Shopify Admin API GraphQL client.
///
/// Cheaply cloneable; the HTTP client and token live behind an `Arc`.
#[derive(Clone)]
pub struct AdminClient {
    inner: Arc<AdminClientInner>,
}

struct AdminClientInner {
    client: reqwest::Client,
    endpoint: String,
    access_token: SecretString,
}

/// GraphQL response wrapper.
#[derive(Debug, Deserialize)]
struct GraphQLResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphQLErrorResponse>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLErrorResponse {
    message: String,
}

impl AdminClient {
    /// Create a client for a configured store.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Http` if the HTTP client fails to build.
    pub fn new(config: &ShopifyAdminConfig) -> Result<Self, AdminError> {
        Self::with_endpoint(config.graphql_endpoint(), config.access_token.clone())
    }

    /// Create a client against an explicit GraphQL endpoint.
    ///
    /// Used by integration tests to point at a local mock of the Admin API.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Http` if the HTTP client fails to build.
    pub fn with_endpoint(
        endpoint: impl Into<String>,
        access_token: SecretString,
    ) -> Result<Self, AdminError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(AdminClientInner {
                client,
                endpoint: endpoint.into(),
                access_token,
            }),
        })
    }

    // =========================================================================
    // GraphQL Execution
    // =========================================================================

    /// Execute a GraphQL document, retrying transient failures.
    async fn execute(&self, query: &str, variables: Value) -> Result<Value, AdminError> {
        let mut attempt = 0;
        loop {
            match self.execute_once(query, &variables).await {
                Ok(data) => return Ok(data),
                Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
                    let delay = match &err {
                        AdminError::RateLimited(seconds) => {
                            Duration::from_secs(*seconds).min(MAX_RETRY_AFTER)
                        }
                        _ => RETRY_BASE_DELAY * 2_u32.pow(attempt),
                    };
                    tracing::warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Admin API request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_once(&self, query: &str, variables: &Value) -> Result<Value, AdminError> {
        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .header(
                "X-Shopify-Access-Token",
                self.inner.access_token.expose_secret(),
            )
            .header("Content-Type", "application/json")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(2);
            return Err(AdminError::RateLimited(retry_after));
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AdminError::Unauthorized(
                "invalid or expired access token".to_string(),
            ));
        }

        if !status.is_success() {
            return Err(AdminError::Status(status.as_u16()));
        }

        let graphql_response: GraphQLResponse = response.json().await?;

        if let Some(errors) = graphql_response.errors
            && !errors.is_empty()
        {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(AdminError::GraphQL(messages.join("; ")));
        }

        graphql_response
            .data
            .ok_or(AdminError::MissingData("data"))
    }

    // =========================================================================
    // Metafields
    // =========================================================================

    /// Read a single metafield value by owner GID.
    ///
    /// Returns `None` both when the metafield is unset and when the owner
    /// itself does not exist; the ledger treats either as "no value".
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(owner_id = %owner_gid))]
    pub async fn metafield(
        &self,
        owner: MetafieldOwner,
        owner_gid: &str,
        namespace: &str,
        key: &str,
    ) -> Result<Option<String>, AdminError> {
        let (query, root) = match owner {
            MetafieldOwner::Customer => (CUSTOMER_METAFIELD_QUERY, "customer"),
            MetafieldOwner::Order => (ORDER_METAFIELD_QUERY, "order"),
        };

        let data = self
            .execute(
                query,
                json!({ "id": owner_gid, "namespace": namespace, "key": key }),
            )
            .await?;

        Ok(data
            .pointer(&format!("/{root}/metafield/value"))
            .and_then(Value::as_str)
            .map(String::from))
    }

    /// Overwrite metafields on a customer via `customerUpdate`.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::UserError` when Shopify reports field-level
    /// validation errors; these must reach the caller.
    #[instrument(skip(self, metafields), fields(customer_id = %customer_gid))]
    pub async fn set_customer_metafields(
        &self,
        customer_gid: &str,
        metafields: &[MetafieldInput],
    ) -> Result<(), AdminError> {
        let data = self
            .execute(
                CUSTOMER_UPDATE_MUTATION,
                json!({ "input": { "id": customer_gid, "metafields": metafields } }),
            )
            .await?;

        let payload = data
            .get("customerUpdate")
            .ok_or(AdminError::MissingData("customerUpdate"))?;

        if let Some(message) = collect_user_errors(payload) {
            return Err(AdminError::UserError(message));
        }

        if payload.pointer("/customer/id").and_then(Value::as_str).is_none() {
            return Err(AdminError::MissingData("customerUpdate.customer"));
        }

        Ok(())
    }

    /// Overwrite metafields on an order via `orderUpdate`.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::UserError` when Shopify reports field-level
    /// validation errors; these must reach the caller.
    #[instrument(skip(self, metafields), fields(order_id = %order_gid))]
    pub async fn set_order_metafields(
        &self,
        order_gid: &str,
        metafields: &[MetafieldInput],
    ) -> Result<(), AdminError> {
        let data = self
            .execute(
                ORDER_UPDATE_MUTATION,
                json!({ "input": { "id": order_gid, "metafields": metafields } }),
            )
            .await?;

        let payload = data
            .get("orderUpdate")
            .ok_or(AdminError::MissingData("orderUpdate"))?;

        if let Some(message) = collect_user_errors(payload) {
            return Err(AdminError::UserError(message));
        }

        if payload.pointer("/order/id").and_then(Value::as_str).is_none() {
            return Err(AdminError::MissingData("orderUpdate.order"));
        }

        Ok(())
    }

    pub(super) async fn run(&self, query: &str, variables: Value) -> Result<Value, AdminError> {
        self.execute(query, variables).await
    }
}

/// Join a mutation payload's `userErrors` into one message, if any.
pub(super) fn collect_user_errors(payload: &Value) -> Option<String> {
    let errors = payload.get("userErrors")?.as_array()?;
    if errors.is_empty() {
        return None;
    }

    let messages: Vec<String> = errors
        .iter()
        .map(|e| {
            let field = e
                .get("field")
                .and_then(Value::as_array)
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(".")
                })
                .unwrap_or_default();
            let message = e.get("message").and_then(Value::as_str).unwrap_or_default();
            format!("{field}: {message}")
        })
        .collect();

    Some(messages.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_are_collected_with_field_paths() {
        let payload = json!({
            "customer": null,
            "userErrors": [
                { "field": ["input", "metafields", "0", "value"], "message": "is invalid" },
                { "field": null, "message": "something else" }
            ]
        });
        let message = collect_user_errors(&payload).expect("user errors present");
        assert!(message.contains("input.metafields.0.value: is invalid"));
        assert!(message.contains("something else"));
    }

    #[test]
    fn empty_user_errors_are_no_error() {
        let payload = json!({ "customer": { "id": "gid://shopify/Customer/1" }, "userErrors": [] });
        assert!(collect_user_errors(&payload).is_none());
    }

    #[test]
    fn structured_metafield_serializes_value_as_json_string() {
        #[derive(Serialize)]
        struct Record {
            state: &'static str,
            points: u64,
        }

        let input = MetafieldInput::structured(
            "loyalty",
            "award",
            &Record { state: "awarded", points: 1200 },
        )
        .expect("serializable");

        assert_eq!(input.value_type, "json");
        assert_eq!(input.value, r#"{"state":"awarded","points":1200}"#);
    }
}
