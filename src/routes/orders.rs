use std::collections::HashMap;

use anyhow::{Context, Result};
use axum::{
    Extension,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper, pg::Pg};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::{CurrentUser, Role},
    lifecycle::{self, NextAction, OrderAction, OrderState, OrderStatus},
    middleware,
    models::{OrderEntity, OrderFileEntity},
    routes::messages,
    schema::{order_files, orders, shops},
};

/// Role-scoped order reads plus the per-order message thread.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_orders))
            .routes(utoipa_axum::routes!(get_order))
            .routes(utoipa_axum::routes!(
                messages::get_messages,
                messages::send_message
            ))
            .routes(utoipa_axum::routes!(messages::mark_messages_read))
            .route_layer(axum::middleware::from_fn(middleware::authorization)),
    )
}

/// Orders the caller may see: customers their own, shop owners those of
/// their shops, admins all of them.
pub(crate) fn visible_orders(user: &CurrentUser) -> orders::BoxedQuery<'static, Pg> {
    let query = orders::table.into_boxed();
    match user.role {
        Role::Customer => query.filter(orders::customer_id.eq(user.id)),
        Role::ShopOwner => query.filter(
            orders::shop_id.eq_any(
                shops::table
                    .filter(shops::owner_id.eq(user.id))
                    .select(shops::id),
            ),
        ),
        Role::Admin => query,
    }
}

pub(crate) async fn load_visible_order(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    user: &CurrentUser,
) -> Result<OrderEntity, AppError> {
    visible_orders(user)
        .filter(orders::id.eq(id))
        .first::<OrderEntity>(conn)
        .await
        .optional()
        .context("Failed to get order")?
        .ok_or(AppError::NotFound)
}

pub(crate) async fn load_files(
    conn: &mut AsyncPgConnection,
    order_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<OrderFileEntity>>> {
    let files: Vec<OrderFileEntity> = order_files::table
        .filter(order_files::order_id.eq_any(order_ids))
        .order_by(order_files::created_at.asc())
        .select(OrderFileEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get order files")?;

    let mut group: HashMap<Uuid, Vec<OrderFileEntity>> = HashMap::new();
    for file in files {
        group.entry(file.order_id).or_default().push(file);
    }
    Ok(group)
}

/// Checks the status the caller observed and computes the resulting state.
pub(crate) fn plan_transition(
    order: &OrderEntity,
    expected: OrderStatus,
    action: OrderAction,
) -> Result<OrderState, AppError> {
    if order.status != expected {
        return Err(AppError::Conflict(format!(
            "Order is {} but the request expected {}",
            order.status, expected
        )));
    }
    Ok(lifecycle::apply(order.state(), action)?)
}

/// Applies a status-changing action with an optimistic check on the status
/// the caller observed. Losing a race yields `Conflict` instead of a second
/// transition.
pub(crate) async fn transition_order(
    conn: &mut AsyncPgConnection,
    order: &OrderEntity,
    expected: OrderStatus,
    action: OrderAction,
) -> Result<OrderEntity, AppError> {
    let next = plan_transition(order, expected, action)?;

    let updated = diesel::update(
        orders::table
            .find(order.id)
            .filter(orders::status.eq(expected)),
    )
    .set((
        orders::status.eq(next.status),
        orders::updated_at.eq(diesel::dsl::now),
    ))
    .returning(OrderEntity::as_returning())
    .get_result(conn)
    .await
    .optional()
    .context("Failed to update order status")?
    .ok_or_else(|| AppError::Conflict("Order was updated concurrently".into()))?;

    info!(
        order_id = %updated.id,
        from = %expected,
        to = %updated.status,
        "Order status changed"
    );
    Ok(updated)
}

#[derive(Serialize, ToSchema)]
pub struct GetOrderRes {
    pub order: OrderEntity,
    pub files: Vec<OrderFileEntity>,
    pub customer_tel_uri: Option<String>,
    /// Advance action offered to the shop; absent for terminal orders.
    pub next_action: Option<NextAction>,
    pub cancellable: bool,
}

impl GetOrderRes {
    pub fn new(order: OrderEntity, files: Vec<OrderFileEntity>, role: Role) -> Self {
        let next_action = match role {
            Role::ShopOwner => NextAction::for_order(order.order_type, order.status),
            Role::Customer | Role::Admin => None,
        };
        Self {
            customer_tel_uri: order.customer_tel_uri(),
            cancellable: lifecycle::can_cancel(role, order.status),
            next_action,
            files,
            order,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GetOrdersQuery {
    /// Only orders in this status.
    pub status: Option<OrderStatus>,
    /// Only urgent (`true`) or non-urgent (`false`) orders.
    pub urgent: Option<bool>,
}

/// Fetch the orders visible to the caller, urgent ones first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(GetOrdersQuery),
    responses(
        (status = 200, description = "List orders", body = StdResponse<Vec<GetOrderRes>, String>)
    )
)]
async fn get_orders(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<GetOrdersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut orders_query = visible_orders(&user);
    if let Some(status) = query.status {
        orders_query = orders_query.filter(orders::status.eq(status));
    }
    if let Some(urgent) = query.urgent {
        orders_query = orders_query.filter(orders::is_urgent.eq(urgent));
    }

    let orders: Vec<OrderEntity> = orders_query
        .order_by((orders::is_urgent.desc(), orders::created_at.desc()))
        .get_results(conn)
        .await
        .context("Failed to get orders")?;

    let order_ids: Vec<Uuid> = orders.iter().map(|order| order.id).collect();
    let mut files = load_files(conn, &order_ids).await?;

    let orders: Vec<GetOrderRes> = orders
        .into_iter()
        .map(|order| {
            let order_files = files.remove(&order.id).unwrap_or_default();
            GetOrderRes::new(order, order_files, user.role)
        })
        .collect();

    Ok(StdResponse {
        data: Some(orders),
        message: Some("Get orders successfully"),
    })
}

/// Fetch a single order visible to the caller.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Order ID to fetch")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<GetOrderRes, String>),
        (status = 404, description = "Order not found or not visible")
    )
)]
async fn get_order(
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
    let files = load_files(conn, &[order.id])
        .await?
        .remove(&order.id)
        .unwrap_or_default();

    Ok(StdResponse {
        data: Some(GetOrderRes::new(order, files, user.role)),
        message: Some("Get order successfully"),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::lifecycle::OrderType;

    fn order(order_type: OrderType, status: OrderStatus) -> OrderEntity {
        OrderEntity {
            id: Uuid::new_v4(),
            customer_id: Some(Uuid::new_v4()),
            shop_id: Uuid::new_v4(),
            customer_name: Some("Ama".into()),
            customer_phone: Some("020 000 0000".into()),
            order_type,
            status,
            is_urgent: false,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn shop_owner_sees_next_action_until_terminal() {
        let res = GetOrderRes::new(
            order(OrderType::WalkIn, OrderStatus::New),
            vec![],
            Role::ShopOwner,
        );
        let action = res.next_action.unwrap();
        assert_eq!(action.to, OrderStatus::Processing);
        assert!(res.cancellable);
        assert_eq!(res.customer_tel_uri.as_deref(), Some("tel:0200000000"));

        let res = GetOrderRes::new(
            order(OrderType::WalkIn, OrderStatus::Completed),
            vec![],
            Role::ShopOwner,
        );
        assert!(res.next_action.is_none());
        assert!(!res.cancellable);
    }

    #[test]
    fn stale_from_status_is_a_conflict() {
        let current = order(OrderType::WalkIn, OrderStatus::Processing);
        let second_click = plan_transition(&current, OrderStatus::New, OrderAction::Advance);
        assert!(matches!(second_click, Err(AppError::Conflict(_))));
    }

    #[test]
    fn terminal_order_cannot_advance_or_cancel() {
        let done = order(OrderType::Digital, OrderStatus::Completed);
        for action in [OrderAction::Advance, OrderAction::Cancel] {
            let result = plan_transition(&done, OrderStatus::Completed, action);
            assert!(matches!(result, Err(AppError::Conflict(_))));
        }
    }

    #[test]
    fn matching_from_status_plans_next_stage() {
        let current = order(OrderType::Digital, OrderStatus::Confirmed);
        let next = plan_transition(&current, OrderStatus::Confirmed, OrderAction::Advance).unwrap();
        assert_eq!(next.status, OrderStatus::Processing);
        let cancelled =
            plan_transition(&current, OrderStatus::Confirmed, OrderAction::Cancel).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
    }

    #[test]
    fn customers_never_get_advance_action() {
        let res = GetOrderRes::new(
            order(OrderType::Digital, OrderStatus::Confirmed),
            vec![],
            Role::Customer,
        );
        assert!(res.next_action.is_none());
        assert!(!res.cancellable);
    }
}
