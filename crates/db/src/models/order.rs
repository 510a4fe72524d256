//! Customer order entity. Orders own jobs; the dispatcher only moves the
//! order to PRINTING when one of its jobs is claimed.

use factoryos_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::OrderStatus;

/// A row from the `orders` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: DbId,
    pub external_order_id: String,
    #[sqlx(rename = "status_id")]
    pub status: OrderStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating an order.
#[derive(Debug, Deserialize)]
pub struct CreateOrder {
    pub external_order_id: String,
}
