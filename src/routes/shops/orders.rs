use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    api::users::non_blank,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::{CurrentUser, Role},
    lifecycle::{self, OrderAction, OrderStatus, OrderType},
    middleware,
    models::{CreateOrderEntity, OrderEntity},
    routes::{
        customers::orders::{OrderFileReq, insert_order, validate_files},
        orders::{GetOrderRes, load_files, load_visible_order, transition_order},
    },
    schema::{orders, shops},
};

/// Defines all shop-owner order routes.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/shops/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(register_walk_in))
            .routes(utoipa_axum::routes!(advance_order))
            .routes(utoipa_axum::routes!(cancel_order))
            .routes(utoipa_axum::routes!(toggle_urgent))
            .route_layer(axum::middleware::from_fn(
                middleware::shop_owners_authorization,
            )),
    )
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterWalkInReq {
    pub shop_id: Uuid,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub files: Vec<OrderFileReq>,
}

/// Register a walk-in job taken at the counter.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Shop orders"],
    security(("bearerAuth" = [])),
    request_body = RegisterWalkInReq,
    responses(
        (status = 200, description = "Registered walk-in order", body = StdResponse<GetOrderRes, String>),
        (status = 404, description = "Shop not found or not owned by caller")
    )
)]
async fn register_walk_in(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<RegisterWalkInReq>,
) -> Result<impl IntoResponse, AppError> {
    validate_files(OrderType::WalkIn, &body.files)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    shops::table
        .find(body.shop_id)
        .filter(shops::owner_id.eq(user.id))
        .select(shops::id)
        .get_result::<Uuid>(conn)
        .await
        .optional()
        .context("Failed to get shop")?
        .ok_or(AppError::NotFound)?;

    let (order, files) = insert_order(
        conn,
        CreateOrderEntity {
            customer_id: None,
            shop_id: body.shop_id,
            customer_name: non_blank(body.customer_name),
            customer_phone: non_blank(body.customer_phone),
            order_type: OrderType::WalkIn,
            status: OrderStatus::New,
            is_urgent: body.is_urgent,
            description: body.description,
        },
        body.files,
    )
    .await?;

    info!(order_id = %order.id, shop_id = %order.shop_id, "Walk-in order registered");

    Ok(StdResponse {
        data: Some(GetOrderRes::new(order, files, Role::ShopOwner)),
        message: Some("Registered walk-in order successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct AdvanceOrderReq {
    /// Status the client last saw. A stale value is rejected with 409 so a
    /// repeated click cannot advance twice.
    #[serde(default)]
    pub from: Option<OrderStatus>,
}

/// Move an order to the next status of its pipeline.
#[utoipa::path(
    post,
    path = "/{id}/advance",
    tags = ["Shop orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Order ID to advance")
    ),
    request_body(content = AdvanceOrderReq, description = "Optional; without a body the stored status is expected"),
    responses(
        (status = 200, description = "Advanced order successfully", body = StdResponse<GetOrderRes, String>),
        (status = 409, description = "Order is terminal or changed since it was read")
    )
)]
async fn advance_order(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    body: Option<Json<AdvanceOrderReq>>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = load_visible_order(conn, id, &user).await?;
    let expected = body.and_then(|Json(body)| body.from).unwrap_or(order.status);
    let advanced = transition_order(conn, &order, expected, OrderAction::Advance).await?;
    let files = load_files(conn, &[advanced.id])
        .await?
        .remove(&advanced.id)
        .unwrap_or_default();

    Ok(StdResponse {
        data: Some(GetOrderRes::new(advanced, files, user.role)),
        message: Some("Advanced order successfully"),
    })
}

/// Cancel an order that has not completed yet.
#[utoipa::path(
    post,
    path = "/{id}/cancel",
    tags = ["Shop orders"],
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

/// Flip the urgent flag of an order. The status is left untouched.
#[utoipa::path(
    post,
    path = "/{id}/urgent",
    tags = ["Shop orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Order ID to toggle")
    ),
    responses(
        (status = 200, description = "Toggled urgency successfully", body = StdResponse<OrderEntity, String>),
        (status = 409, description = "Order changed concurrently")
    )
)]
async fn toggle_urgent(
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
    let toggled = lifecycle::apply(order.state(), OrderAction::ToggleUrgent)?;

    let updated_order = diesel::update(
        orders::table
            .find(order.id)
            .filter(orders::is_urgent.eq(order.is_urgent)),
    )
    .set((
        orders::is_urgent.eq(toggled.is_urgent),
        orders::updated_at.eq(diesel::dsl::now),
    ))
    .returning(OrderEntity::as_returning())
    .get_result(conn)
    .await
    .optional()
    .context("Failed to update order urgency")?
    .ok_or_else(|| AppError::Conflict("Order was updated concurrently".into()))?;

    info!(order_id = %updated_order.id, is_urgent = updated_order.is_urgent, "Order urgency toggled");

    Ok(StdResponse {
        data: Some(updated_order),
        message: Some("Toggled urgency successfully"),
    })
}
