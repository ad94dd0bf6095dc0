use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

/// Catalog product. Price is in integer JPY units.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const PRODUCT_COLUMNS: &str =
    "id, name, description, price, image_url, created_at, updated_at";

/// Repository for catalog products
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_all(&self) -> Result<Vec<Product>, DatabaseError> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products ORDER BY created_at ASC, id ASC",
            PRODUCT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_id(&self, product_id: i64) -> Result<Option<Product>, DatabaseError> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
