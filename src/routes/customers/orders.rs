use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    api::users::{contact_snapshot, get_user_profile},
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::{CurrentUser, Role},
    lifecycle::{self, OrderAction, OrderStatus, OrderType},
    middleware,
    models::{CreateOrderEntity, CreateOrderFileEntity, OrderEntity, OrderFileEntity},
    routes::orders::{GetOrderRes, load_visible_order, transition_order},
    schema::{order_files, orders, shops},
};

/// Defines all customer-facing order routes.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/customers/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_order))
            .routes(utoipa_axum::routes!(cancel_order))
            .route_layer(axum::middleware::from_fn(
                middleware::customers_authorization,
            )),
    )
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct OrderFileReq {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub url: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateOrderReq {
    pub shop_id: Uuid,
    pub order_type: OrderType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub files: Vec<OrderFileReq>,
    /// Overrides the name on the customer's profile.
    #[serde(default)]
    pub customer_name: Option<String>,
    /// Overrides the phone number on the customer's profile.
    #[serde(default)]
    pub customer_phone: Option<String>,
}

/// Rejects orders that cannot be fulfilled as submitted.
pub fn validate_files(order_type: OrderType, files: &[OrderFileReq]) -> Result<(), AppError> {
    if order_type == OrderType::Digital && files.is_empty() {
        return Err(AppError::BadRequest(
            "Digital orders need at least one file".into(),
        ));
    }
    for file in files {
        if file.name.trim().is_empty() || file.url.trim().is_empty() {
            return Err(AppError::BadRequest("Files need a name and a url".into()));
        }
        if file.size_bytes < 0 {
            return Err(AppError::BadRequest(format!(
                "File {} has a negative size",
                file.name
            )));
        }
    }
    Ok(())
}

/// Inserts an order and its files after checking the shop exists.
pub(crate) async fn insert_order(
    conn: &mut AsyncPgConnection,
    new_order: CreateOrderEntity,
    files: Vec<OrderFileReq>,
) -> Result<(OrderEntity, Vec<OrderFileEntity>), AppError> {
    conn.transaction(move |conn| {
        Box::pin(async move {
            let shop_count: i64 = shops::table
                .find(new_order.shop_id)
                .count()
                .get_result(conn)
                .await
                .context("Failed to get count")?;

            if shop_count == 0 {
                return Err(AppError::NotFound);
            }

            let order = diesel::insert_into(orders::table)
                .values(new_order)
                .returning(OrderEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to create order")?;

            let rows: Vec<CreateOrderFileEntity> = files
                .into_iter()
                .map(|file| CreateOrderFileEntity {
                    order_id: order.id,
                    name: file.name,
                    mime_type: file.mime_type,
                    size_bytes: file.size_bytes,
                    url: file.url,
                })
                .collect();

            let files = if rows.is_empty() {
                Vec::new()
            } else {
                diesel::insert_into(order_files::table)
                    .values(rows)
                    .returning(OrderFileEntity::as_returning())
                    .get_results(conn)
                    .await
                    .context("Failed to attach order files")?
            };

            Ok::<(OrderEntity, Vec<OrderFileEntity>), AppError>((order, files))
        })
    })
    .await
}

/// Place a new order at a shop.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    request_body = CreateOrderReq,
    responses(
        (status = 200, description = "Created order successfully", body = StdResponse<GetOrderRes, String>),
        (status = 400, description = "Invalid order"),
        (status = 404, description = "Shop not found")
    )
)]
async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    validate_files(body.order_type, &body.files)?;

    let profile =
        get_user_profile(&state.http_client, &state.api_urls.user_service_url, user.id).await?;
    let (customer_name, customer_phone) =
        contact_snapshot(&profile, body.customer_name, body.customer_phone);

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (order, files) = insert_order(
        conn,
        CreateOrderEntity {
            customer_id: Some(user.id),
            shop_id: body.shop_id,
            customer_name,
            customer_phone,
            order_type: body.order_type,
            status: OrderStatus::New,
            is_urgent: body.is_urgent,
            description: body.description,
        },
        body.files,
    )
    .await?;

    info!(order_id = %order.id, shop_id = %order.shop_id, order_type = %order.order_type, "Order created");

    Ok(StdResponse {
        data: Some(GetOrderRes::new(order, files, Role::Customer)),
        message: Some("Create order successfully"),
    })
}

/// Withdraw an order the shop has not picked up yet.
#[utoipa::path(
    post,
    path = "/{id}/cancel",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Order ID to cancel")
    ),
    responses(
        (status = 200, description = "Cancelled order successfully", body = StdResponse<OrderEntity, String>),
        (status = 403, description = "Order is already being processed"),
        (status = 409, description = "Order changed concurrently")
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
    if !order.status.is_terminal() && !lifecycle::can_cancel(Role::Customer, order.status) {
        return Err(AppError::ForbiddenResource(
            "Order is already being processed by the shop".into(),
        ));
    }

    let cancelled_order = transition_order(conn, &order, order.status, OrderAction::Cancel).await?;

    Ok(StdResponse {
        data: Some(cancelled_order),
        message: Some("Cancelled order successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, size_bytes: i64) -> OrderFileReq {
        OrderFileReq {
            name: name.into(),
            mime_type: "application/pdf".into(),
            size_bytes,
            url: "https://files.example/thesis.pdf".into(),
        }
    }

    #[test]
    fn digital_orders_need_files() {
        assert!(matches!(
            validate_files(OrderType::Digital, &[]),
            Err(AppError::BadRequest(_))
        ));
        assert!(validate_files(OrderType::Digital, &[file("thesis.pdf", 1024)]).is_ok());
        assert!(validate_files(OrderType::WalkIn, &[]).is_ok());
    }

    #[test]
    fn rejects_malformed_files() {
        assert!(validate_files(OrderType::WalkIn, &[file(" ", 10)]).is_err());
        assert!(validate_files(OrderType::Digital, &[file("a.pdf", -1)]).is_err());
    }

    #[test]
    fn accepts_legacy_order_type_in_request() {
        let body: CreateOrderReq = serde_json::from_value(serde_json::json!({
            "shop_id": Uuid::nil(),
            "order_type": "uploaded-files",
            "files": [{"name": "a.pdf", "mime_type": "application/pdf", "size_bytes": 3, "url": "u"}]
        }))
        .unwrap();
        assert_eq!(body.order_type, OrderType::Digital);
        assert!(!body.is_urgent);
        assert_eq!(body.files.len(), 1);
    }
}
