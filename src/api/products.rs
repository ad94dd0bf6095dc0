use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::database::product_repository::ProductRepository;
use crate::error::AppError;

/// State for catalog reads
#[derive(Clone)]
pub struct CatalogState {
    pub products: Arc<ProductRepository>,
}

/// GET /api/products
pub async fn list_products(State(state): State<CatalogState>) -> Response {
    match state.products.find_all().await {
        Ok(products) => (
            StatusCode::OK,
            Json(json!({"success": true, "products": products})),
        )
            .into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

/// GET /api/products/{id}
pub async fn get_product(
    State(state): State<CatalogState>,
    Path(raw_id): Path<String>,
) -> Response {
    let Ok(product_id) = raw_id.parse::<i64>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid product ID"})),
        )
            .into_response();
    };

    match state.products.find_by_id(product_id).await {
        Ok(Some(product)) => (
            StatusCode::OK,
            Json(json!({"success": true, "product": product})),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Product not found"})),
        )
            .into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}
