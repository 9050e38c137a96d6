use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app_error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    ShopOwner,
    Admin,
}

impl Role {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "customer" => Some(Role::Customer),
            "shop_owner" | "shop-owner" | "shop" => Some(Role::ShopOwner),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Caller identity forwarded by the gateway, inserted into request
/// extensions by the authorization middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: Role,
}

impl CurrentUser {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| AppError::Unauthorized(format!("Missing {name} header")))
        };

        let id = Uuid::parse_str(header(USER_ID_HEADER)?.trim())
            .map_err(|_| AppError::Unauthorized(format!("Malformed {USER_ID_HEADER} header")))?;
        let role = Role::parse(header(USER_ROLE_HEADER)?)
            .ok_or_else(|| AppError::Unauthorized(format!("Unknown {USER_ROLE_HEADER} value")))?;

        Ok(Self { id, role })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(id: &str, role: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_str(id).unwrap());
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_str(role).unwrap());
        headers
    }

    #[test]
    fn parses_gateway_headers() {
        let id = Uuid::new_v4();
        let user = CurrentUser::from_headers(&headers(&id.to_string(), "Shop_Owner")).unwrap();
        assert_eq!(user, CurrentUser { id, role: Role::ShopOwner });
    }

    #[test]
    fn rejects_missing_or_malformed_identity() {
        assert!(matches!(
            CurrentUser::from_headers(&HeaderMap::new()),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            CurrentUser::from_headers(&headers("42", "customer")),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            CurrentUser::from_headers(&headers(&Uuid::new_v4().to_string(), "root")),
            Err(AppError::Unauthorized(_))
        ));
    }
}
