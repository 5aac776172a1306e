//! Read-only HTTP gateway
//!
//! Exposes the network registry, contract resolution, on-chain fee
//! distributions and payment record refreshes over axum. Chain access goes
//! through dedicated RPC providers; no wallet is involved.

use crate::config::PaymentsConfig;
use crate::fees::FeeBookkeeper;
use crate::normalize::{descriptor_for, normalize};
use crate::payments::PaymentOrchestrator;
use crate::provider::ProviderFactory;
use crate::resolver::ContractResolver;
use crate::session::SessionManager;
use crate::store::ConfigStore;
use crate::types::{format_address, ContractFamily, NetworkDescriptor};
use crate::PaymentError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared services behind the routes
#[derive(Clone)]
pub struct GatewayState {
    pub resolver: Arc<ContractResolver>,
    pub fees: Arc<FeeBookkeeper>,
    pub payments: Arc<PaymentOrchestrator>,
}

impl GatewayState {
    pub fn new(
        config: &PaymentsConfig,
        store: Arc<dyn ConfigStore>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self::with_resolver(
            config,
            Arc::new(ContractResolver::new(store).with_cache_ttl(config.cache_ttl)),
            providers,
        )
    }

    pub fn with_resolver(
        config: &PaymentsConfig,
        resolver: Arc<ContractResolver>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        // no wallet ever connects to the gateway session
        let session = SessionManager::new(config.session_config());
        let fees = FeeBookkeeper::new(session.clone(), resolver.clone(), providers.clone())
            .with_confirm_policy(config.confirm_policy());
        let payments = PaymentOrchestrator::new(session, resolver.clone(), providers)
            .with_config(config.clone());
        Self {
            resolver,
            fees: Arc::new(fees),
            payments: Arc::new(payments),
        }
    }
}

/// Error body returned by every route
pub struct ApiError(PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            PaymentError::RecordNotFound(_) | PaymentError::ContractNotConfigured { .. } => {
                StatusCode::NOT_FOUND
            }
            PaymentError::UnsupportedNetwork { .. }
            | PaymentError::InvalidAddress(_)
            | PaymentError::InvalidAmount(_)
            | PaymentError::InvalidDeadline(_)
            | PaymentError::InvalidDistribution(_)
            | PaymentError::CurrencyMismatch { .. }
            | PaymentError::Config(_) => StatusCode::BAD_REQUEST,
            PaymentError::NoWalletConnected => StatusCode::UNAUTHORIZED,
            PaymentError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            PaymentError::TransactionTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            PaymentError::RemoteStoreUnavailable(_)
            | PaymentError::Rpc(_)
            | PaymentError::Http(_)
            | PaymentError::ContractCallReverted(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "Gateway request failed");
        }
        let body = json!({
            "error": self.0.code(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the gateway routes
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/networks", get(networks))
        .route("/networks/normalize", get(normalize_network))
        .route("/contracts/{family}/{network}", get(contract_address))
        .route("/fees/{network}", get(fee_distribution))
        .route("/payments/{id}/refresh", post(refresh_payment))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": crate::VERSION,
    }))
}

async fn networks() -> Json<&'static [NetworkDescriptor]> {
    Json(NetworkDescriptor::all())
}

#[derive(Debug, Deserialize)]
struct NormalizeQuery {
    name: String,
}

async fn normalize_network(Query(query): Query<NormalizeQuery>) -> Json<Value> {
    let descriptor = descriptor_for(&query.name);
    Json(json!({
        "input": query.name,
        "canonicalKey": normalize(&query.name),
        "chainId": descriptor.map(|d| d.chain_id),
        "supported": descriptor.is_some(),
    }))
}

async fn contract_address(
    State(state): State<GatewayState>,
    Path((family, network)): Path<(String, String)>,
) -> ApiResult<Value> {
    let family = ContractFamily::from_name(&family)
        .ok_or_else(|| PaymentError::config(format!("unknown contract family {}", family)))?;
    let address = state.resolver.require(&network, family).await?;
    Ok(Json(json!({
        "family": family.as_str(),
        "network": normalize(&network),
        "address": format_address(&address),
    })))
}

async fn fee_distribution(
    State(state): State<GatewayState>,
    Path(network): Path<String>,
) -> ApiResult<Value> {
    let config = state.fees.get_distribution(&network).await?;
    let mut body = serde_json::to_value(&config).map_err(PaymentError::from)?;
    body["totalPercentage"] = json!(config.total_percentage());
    body["mainWalletShare"] = json!(config.main_wallet_share());
    Ok(Json(body))
}

async fn refresh_payment(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<crate::types::PaymentTransactionRecord> {
    Ok(Json(state.payments.refresh_status(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::abi::Token;
    use crate::provider::mock::{MockFactory, MockProvider};
    use crate::store::InMemoryConfigStore;
    use crate::types::{FeeDistributionConfig, FeeRole};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use ethereum_types::{Address, U256};
    use tower::ServiceExt;

    fn polygon_contract() -> Address {
        Address::from_low_u64_be(0xfee)
    }

    fn app(factory: MockFactory) -> Router {
        let store = Arc::new(InMemoryConfigStore::new());
        let resolver = Arc::new(ContractResolver::new(store).with_fallbacks(&[(
            ContractFamily::Payment,
            "polygon",
            polygon_contract(),
        )]));
        router(GatewayState::with_resolver(
            &PaymentsConfig::default(),
            resolver,
            Arc::new(factory),
        ))
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health_and_networks() {
        let (status, body) = call(app(MockFactory::new()), "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = call(app(MockFactory::new()), "GET", "/networks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body.as_array().map(Vec::len),
            Some(NetworkDescriptor::all().len())
        );
    }

    #[tokio::test]
    async fn test_normalize_route() {
        let (status, body) = call(
            app(MockFactory::new()),
            "GET",
            "/networks/normalize?name=BSC%20Testnet",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["canonicalKey"], "binanceTestnet");
        assert_eq!(body["chainId"], 97);
        assert_eq!(body["supported"], true);
    }

    #[tokio::test]
    async fn test_contract_route() {
        let (status, body) = call(app(MockFactory::new()), "GET", "/contracts/payment/matic").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["network"], "polygon");
        assert_eq!(body["address"], format_address(&polygon_contract()));

        let (status, body) = call(app(MockFactory::new()), "GET", "/contracts/payment/fantom").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "contract_not_configured");

        let (status, _) = call(app(MockFactory::new()), "GET", "/contracts/staking/polygon").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_fee_route_reads_chain() {
        let polygon = Arc::new(MockProvider::new(137, Address::zero()));
        let mut config = FeeDistributionConfig::default();
        for (i, role) in FeeRole::all().into_iter().enumerate() {
            config.set_wallet(role, Address::from_low_u64_be(i as u64 + 1));
            config.set_percentage(role, 25);
        }
        for role in FeeRole::all() {
            polygon.on_call(
                polygon_contract(),
                role.wallet_getter(),
                &[Token::Address(config.wallet(role))],
            );
            polygon.on_call(
                polygon_contract(),
                role.percentage_getter(),
                &[Token::Uint(U256::from(config.percentage(role)))],
            );
        }

        let (status, body) = call(
            app(MockFactory::new().with("polygon", polygon)),
            "GET",
            "/fees/polygon",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalPercentage"], 100);
        assert_eq!(body["mainWalletShare"], 900);
    }

    #[test]
    fn test_request_errors_are_bad_request() {
        for err in [
            PaymentError::InvalidDeadline("2020-01-01T00:00:00+00:00 is not in the future".into()),
            PaymentError::invalid_amount("amount 0 must be positive"),
            PaymentError::unsupported_network("Chain 31337"),
        ] {
            assert_eq!(ApiError::from(err).status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_refresh_missing_payment() {
        let (status, body) = call(app(MockFactory::new()), "POST", "/payments/nope/refresh").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "record_not_found");
    }
}
