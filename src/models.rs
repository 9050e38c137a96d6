use chrono::{DateTime, Utc};
use diesel::{
    Selectable,
    prelude::{Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::lifecycle::{OrderState, OrderStatus, OrderType};

// Shops

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::shops)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ShopEntity {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::shops)]
pub struct CreateShopEntity {
    pub owner_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

// Orders

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub shop_id: Uuid,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub is_urgent: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderEntity {
    pub fn state(&self) -> OrderState {
        OrderState {
            order_type: self.order_type,
            status: self.status,
            is_urgent: self.is_urgent,
        }
    }

    /// `tel:` link for the stored phone number. The number is not validated.
    pub fn customer_tel_uri(&self) -> Option<String> {
        self.customer_phone.as_deref().and_then(tel_uri)
    }
}

pub fn tel_uri(phone: &str) -> Option<String> {
    let compact: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    (!compact.is_empty()).then(|| format!("tel:{compact}"))
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateOrderEntity {
    pub customer_id: Option<Uuid>,
    pub shop_id: Uuid,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub is_urgent: bool,
    pub description: Option<String>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::order_files)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderFileEntity {
    pub id: Uuid,
    pub order_id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_files)]
pub struct CreateOrderFileEntity {
    pub order_id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub url: String,
}

// Messages

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MessageEntity {
    pub id: Uuid,
    pub order_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::messages)]
pub struct CreateMessageEntity {
    pub order_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tel_uri_strips_whitespace_only() {
        assert_eq!(tel_uri("+1 555 0100").as_deref(), Some("tel:+15550100"));
        assert_eq!(tel_uri("(555) 0100").as_deref(), Some("tel:(555)0100"));
        assert_eq!(tel_uri("   "), None);
    }
}
