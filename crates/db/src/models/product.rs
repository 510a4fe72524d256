//! Product catalog entity: what a job prints and with which filament.

use factoryos_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `products` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Product {
    pub id: DbId,
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub file_path_3mf: String,
    /// Material type, e.g. `PLA`, `PETG`.
    pub required_filament_type: Option<String>,
    /// Single hex color, e.g. `#FF0000`.
    pub required_filament_color: Option<String>,
    pub created_at: Timestamp,
}

impl Product {
    /// Declared material, treating blank values as undeclared.
    pub fn required_material(&self) -> Option<&str> {
        self.required_filament_type
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// Required colors in mapping order. Products declare at most one.
    pub fn required_colors(&self) -> Vec<String> {
        self.required_filament_color
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// DTO for creating a product.
#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub file_path_3mf: String,
    pub required_filament_type: Option<String>,
    pub required_filament_color: Option<String>,
}
