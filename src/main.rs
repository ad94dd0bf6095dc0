use axum::{
    routing::{get, post},
    Json, Router,
};
use dotenv::dotenv;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::info;

use nomimono_backend::api;
use nomimono_backend::config::AppConfig;
use nomimono_backend::database;
use nomimono_backend::database::order_repository::OrderRepository;
use nomimono_backend::database::payment_repository::PaymentRepository;
use nomimono_backend::database::product_repository::ProductRepository;
use nomimono_backend::database::store::PgOrderStore;
use nomimono_backend::health::{health, HealthApiState, HealthChecker};
use nomimono_backend::logging::init_tracing;
use nomimono_backend::middleware::logging::{request_logging_middleware, UuidRequestId};
use nomimono_backend::payments::provider::PaymentProvider;
use nomimono_backend::payments::providers::paypay::PayPayProvider;
use nomimono_backend::services::reconciler::PaymentReconciler;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "nomimono-backend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting nomimono backend service"
    );

    let db_pool = database::init_pool_from_config(&config.database).await?;

    let gateway: Arc<dyn PaymentProvider> = Arc::new(PayPayProvider::from_env()?);
    let store = Arc::new(PgOrderStore::new(db_pool.clone()));
    let reconciler = Arc::new(PaymentReconciler::new(store, gateway.clone()));

    let products = Arc::new(ProductRepository::new(db_pool.clone()));
    let orders = Arc::new(OrderRepository::new(db_pool.clone()));
    let payments = Arc::new(PaymentRepository::new(db_pool.clone()));

    let catalog_routes = Router::new()
        .route("/api/products", get(api::products::list_products))
        .route("/api/products/{id}", get(api::products::get_product))
        .with_state(api::products::CatalogState {
            products: products.clone(),
        });

    let checkout_routes = Router::new()
        .route("/api/create-payment", post(api::payments::create_payment))
        .with_state(api::payments::CheckoutState {
            products: products.clone(),
            orders: orders.clone(),
            payments: payments.clone(),
            gateway: gateway.clone(),
            storefront: config.storefront.clone(),
        });

    let order_routes = Router::new()
        .route("/api/order-details", get(api::orders::order_details))
        .with_state(api::orders::OrderDetailsState {
            orders,
            payments,
            products,
        });

    let status_routes = Router::new()
        .route(
            "/api/payment-status",
            get(api::payment_status::check_payment_status)
                .post(api::payment_status::payment_status_action),
        )
        .with_state(api::payment_status::PaymentStatusState {
            reconciler: reconciler.clone(),
        });

    let webhook_routes = Router::new()
        .route(
            "/api/paypay-webhook",
            post(api::webhooks::handle_paypay_webhook),
        )
        .with_state(api::webhooks::WebhookState { reconciler });

    let health_routes = Router::new()
        .route("/health", get(health))
        .with_state(HealthApiState {
            checker: HealthChecker::new(db_pool.clone()),
        });

    let app = Router::new()
        .route("/", get(root))
        .merge(health_routes)
        .merge(catalog_routes)
        .merge(checkout_routes)
        .merge(order_routes)
        .merge(status_routes)
        .merge(webhook_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
