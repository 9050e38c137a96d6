use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::CurrentUser,
    lifecycle::{OrderAction, OrderStatus},
    middleware,
    models::{CreateShopEntity, OrderEntity, ShopEntity},
    routes::orders::{load_visible_order, transition_order},
    schema::{orders, shops},
};

/// Defines admin oversight routes.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/admin",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_orders_summary))
            .routes(utoipa_axum::routes!(cancel_order))
            .routes(utoipa_axum::routes!(get_shops, create_shop))
            .route_layer(axum::middleware::from_fn(middleware::admins_authorization)),
    )
}

#[derive(Serialize, ToSchema, Debug, PartialEq, Eq)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

#[derive(Serialize, ToSchema)]
pub struct OrdersSummaryRes {
    pub by_status: Vec<StatusCount>,
    pub total: i64,
    /// Urgent orders that are not completed or cancelled yet.
    pub open_urgent: i64,
}

/// One entry per status in lifecycle order, zero-filled.
pub fn summarize(counts: Vec<(OrderStatus, i64)>) -> Vec<StatusCount> {
    let counts: HashMap<OrderStatus, i64> = counts.into_iter().collect();
    OrderStatus::ALL
        .into_iter()
        .map(|status| StatusCount {
            status,
            count: counts.get(&status).copied().unwrap_or(0),
        })
        .collect()
}

/// Count orders per status across every shop.
#[utoipa::path(
    get,
    path = "/orders/summary",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Order summary", body = StdResponse<OrdersSummaryRes, String>)
    )
)]
async fn get_orders_summary(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let counts: Vec<(OrderStatus, i64)> = orders::table
        .group_by(orders::status)
        .select((orders::status, diesel::dsl::count_star()))
        .load(conn)
        .await
        .context("Failed to count orders")?;

    let open_urgent: i64 = orders::table
        .filter(orders::is_urgent.eq(true))
        .filter(orders::status.ne_all(vec![OrderStatus::Completed, OrderStatus::Cancelled]))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count urgent orders")?;

    let by_status = summarize(counts);
    let total = by_status.iter().map(|entry| entry.count).sum();

    Ok(StdResponse {
        data: Some(OrdersSummaryRes {
            by_status,
            total,
            open_urgent,
        }),
        message: Some("Get orders summary successfully"),
    })
}

/// Cancel any non-terminal order.
#[utoipa::path(
    post,
    path = "/orders/{id}/cancel",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Order ID to cancel")
    ),
    responses(
        (status = 200, description = "Cancelled order successfully", body = StdResponse<OrderEntity, String>),
        (status = 409, description = "Order is already terminal")
    )
)]
async fn cancel_order(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = load_visible_order(conn, id, &user).await?;
    let cancelled_order = transition_order(conn, &order, order.status, OrderAction::Cancel).await?;

    Ok(StdResponse {
        data: Some(cancelled_order),
        message: Some("Cancelled order successfully"),
    })
}

/// Fetch all shops.
#[utoipa::path(
    get,
    path = "/shops",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List shops", body = StdResponse<Vec<ShopEntity>, String>)
    )
)]
async fn get_shops(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let shops: Vec<ShopEntity> = shops::table
        .order_by(shops::name.asc())
        .select(ShopEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get shops")?;

    Ok(StdResponse {
        data: Some(shops),
        message: Some("Get shops successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct CreateShopReq {
    pub owner_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Register a shop for an owner.
#[utoipa::path(
    post,
    path = "/shops",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    request_body = CreateShopReq,
    responses(
        (status = 200, description = "Created shop successfully", body = StdResponse<ShopEntity, String>),
        (status = 400, description = "Shop name is empty")
    )
)]
async fn create_shop(
    State(state): State<AppState>,
    Json(body): Json<CreateShopReq>,
) -> Result<impl IntoResponse, AppError> {
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Shop name must not be empty".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let shop = diesel::insert_into(shops::table)
        .values(CreateShopEntity {
            owner_id: body.owner_id,
            name,
            phone: body.phone,
            address: body.address,
        })
        .returning(ShopEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create shop")?;

    info!(shop_id = %shop.id, owner_id = %shop.owner_id, "Shop created");

    Ok(StdResponse {
        data: Some(shop),
        message: Some("Created shop successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_every_status_in_order() {
        let summary = summarize(vec![
            (OrderStatus::Completed, 4),
            (OrderStatus::New, 2),
        ]);
        assert_eq!(summary.len(), OrderStatus::ALL.len());
        assert_eq!(
            summary[0],
            StatusCount {
                status: OrderStatus::New,
                count: 2
            }
        );
        assert_eq!(summary[1].count, 0);
        assert_eq!(summary[4].status, OrderStatus::Completed);
        assert_eq!(summary[4].count, 4);
    }
}
