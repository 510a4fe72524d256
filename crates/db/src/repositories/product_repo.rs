//! Repository for the `products` table.

use sqlx::PgPool;

use crate::models::product::{CreateProduct, Product};

/// Column list for `products` queries.
const COLUMNS: &str = "\
    id, name, sku, description, file_path_3mf, \
    required_filament_type, required_filament_color, created_at";

/// Provides CRUD operations for products.
pub struct ProductRepo;

impl ProductRepo {
    /// Insert a new product.
    pub async fn create(pool: &PgPool, input: &CreateProduct) -> Result<Product, sqlx::Error> {
        let query = format!(
            "INSERT INTO products \
                 (name, sku, description, file_path_3mf, required_filament_type, required_filament_color) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&query)
            .bind(&input.name)
            .bind(&input.sku)
            .bind(&input.description)
            .bind(&input.file_path_3mf)
            .bind(&input.required_filament_type)
            .bind(&input.required_filament_color)
            .fetch_one(pool)
            .await
    }

    /// Find the product whose build file is `path`.
    ///
    /// Jobs reference products only through the build-file path; if several
    /// products share a file the oldest wins.
    pub async fn find_by_file_path(
        pool: &PgPool,
        path: &str,
    ) -> Result<Option<Product>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM products WHERE file_path_3mf = $1 ORDER BY id ASC LIMIT 1"
        );
        sqlx::query_as::<_, Product>(&query)
            .bind(path)
            .fetch_optional(pool)
            .await
    }
}
