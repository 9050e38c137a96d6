use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use diesel::{BoolExpressionMethods, ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::{CurrentUser, Role},
    models::{CreateMessageEntity, MessageEntity, OrderEntity},
    routes::orders::load_visible_order,
    schema::{messages, shops},
};

pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Trims the message text. Blank messages are rejected so no write is issued.
pub fn normalize_message(raw: &str) -> Result<String, AppError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("Message must not be empty".into()));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::BadRequest(format!(
            "Message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(text.to_string())
}

/// The other participant of the order's thread, if the sender is a participant.
pub fn counterpart(order: &OrderEntity, shop_owner_id: Uuid, sender_id: Uuid) -> Option<Uuid> {
    if Some(sender_id) == order.customer_id {
        Some(shop_owner_id)
    } else if sender_id == shop_owner_id {
        order.customer_id
    } else {
        None
    }
}

async fn shop_owner_of(conn: &mut AsyncPgConnection, order: &OrderEntity) -> Result<Uuid, AppError> {
    let owner_id: Uuid = shops::table
        .find(order.shop_id)
        .select(shops::owner_id)
        .get_result(conn)
        .await
        .context("Failed to get shop owner")?;
    Ok(owner_id)
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GetMessagesQuery {
    /// `created_at` of the last message the client holds.
    pub after: Option<DateTime<Utc>>,
    /// `id` of that message. With it, messages sharing the `after` timestamp
    /// but sorting later are returned too; without it the cursor is strictly
    /// `created_at > after`.
    pub after_id: Option<Uuid>,
}

impl GetMessagesQuery {
    /// Position after which messages are returned, in `(created_at, id)` order.
    pub fn cursor(&self) -> Result<Option<(DateTime<Utc>, Option<Uuid>)>, AppError> {
        match (self.after, self.after_id) {
            (None, Some(_)) => Err(AppError::BadRequest(
                "after_id requires after".into(),
            )),
            (after, after_id) => Ok(after.map(|after| (after, after_id))),
        }
    }
}

/// Fetch the message thread of an order, oldest first.
#[utoipa::path(
    get,
    path = "/{id}/messages",
    tags = ["Messages"],
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Order ID"),
        GetMessagesQuery
    ),
    responses(
        (status = 200, description = "List messages", body = StdResponse<Vec<MessageEntity>, String>)
    )
)]
pub async fn get_messages(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<GetMessagesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let cursor = query.cursor()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = load_visible_order(conn, id, &user).await?;

    let mut messages_query = messages::table
        .filter(messages::order_id.eq(order.id))
        .into_boxed();
    match cursor {
        Some((after, Some(after_id))) => {
            messages_query = messages_query.filter(
                messages::created_at.gt(after).or(messages::created_at
                    .eq(after)
                    .and(messages::id.gt(after_id))),
            );
        }
        Some((after, None)) => {
            messages_query = messages_query.filter(messages::created_at.gt(after));
        }
        None => {}
    }

    let messages: Vec<MessageEntity> = messages_query
        .order_by((messages::created_at.asc(), messages::id.asc()))
        .get_results(conn)
        .await
        .context("Failed to get messages")?;

    Ok(StdResponse {
        data: Some(messages),
        message: Some("Get messages successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct SendMessageReq {
    pub message: String,
    /// Defaults to the other participant of the order.
    #[serde(default, alias = "recipientId")]
    pub recipient_id: Option<Uuid>,
}

/// Send a message on an order's thread. Returns the stored message so the
/// client can append it without refetching the thread.
#[utoipa::path(
    post,
    path = "/{id}/messages",
    tags = ["Messages"],
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    request_body = SendMessageReq,
    responses(
        (status = 200, description = "Message sent", body = StdResponse<MessageEntity, String>),
        (status = 400, description = "Empty message or invalid recipient")
    )
)]
pub async fn send_message(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<SendMessageReq>,
) -> Result<impl IntoResponse, AppError> {
    let text = normalize_message(&body.message)?;
    if user.role == Role::Admin {
        return Err(AppError::ForbiddenResource(
            "Only order participants can send messages".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = load_visible_order(conn, id, &user).await?;
    let shop_owner_id = shop_owner_of(conn, &order).await?;
    let recipient_id = counterpart(&order, shop_owner_id, user.id).ok_or_else(|| {
        AppError::BadRequest("Order has no counterpart to message".into())
    })?;
    if body.recipient_id.is_some_and(|requested| requested != recipient_id) {
        return Err(AppError::BadRequest(
            "Recipient is not a participant of this order".into(),
        ));
    }

    let message = diesel::insert_into(messages::table)
        .values(CreateMessageEntity {
            order_id: order.id,
            sender_id: user.id,
            recipient_id,
            message: text,
        })
        .returning(MessageEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create message")?;

    info!(order_id = %order.id, message_id = %message.id, "Message sent");

    Ok(StdResponse {
        data: Some(message),
        message: Some("Sent message successfully"),
    })
}

#[derive(Serialize, ToSchema)]
pub struct MarkReadRes {
    pub marked: usize,
}

/// Mark every message addressed to the caller on this order as read.
#[utoipa::path(
    post,
    path = "/{id}/messages/read",
    tags = ["Messages"],
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Messages marked as read", body = StdResponse<MarkReadRes, String>)
    )
)]
pub async fn mark_messages_read(
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

    let marked = diesel::update(
        messages::table
            .filter(messages::order_id.eq(order.id))
            .filter(messages::recipient_id.eq(user.id))
            .filter(messages::is_read.eq(false)),
    )
    .set(messages::is_read.eq(true))
    .execute(conn)
    .await
    .context("Failed to mark messages as read")?;

    Ok(StdResponse {
        data: Some(MarkReadRes { marked }),
        message: Some("Marked messages as read"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{OrderStatus, OrderType};

    fn order(customer_id: Option<Uuid>) -> OrderEntity {
        OrderEntity {
            id: Uuid::new_v4(),
            customer_id,
            shop_id: Uuid::new_v4(),
            customer_name: None,
            customer_phone: None,
            order_type: OrderType::Digital,
            status: OrderStatus::New,
            is_urgent: false,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn blank_messages_are_rejected() {
        for raw in ["", "   ", "\n\t "] {
            assert!(matches!(normalize_message(raw), Err(AppError::BadRequest(_))));
        }
    }

    #[test]
    fn messages_are_trimmed_and_bounded() {
        assert_eq!(normalize_message("  ready at 5?  ").unwrap(), "ready at 5?");
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(normalize_message(&long).is_err());
        assert!(normalize_message(&long[1..]).is_ok());
    }

    #[test]
    fn counterpart_is_the_other_participant() {
        let customer = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let order = order(Some(customer));
        assert_eq!(counterpart(&order, owner, customer), Some(owner));
        assert_eq!(counterpart(&order, owner, owner), Some(customer));
        assert_eq!(counterpart(&order, owner, Uuid::new_v4()), None);
    }

    #[test]
    fn counter_walk_ins_have_no_thread() {
        let owner = Uuid::new_v4();
        assert_eq!(counterpart(&order(None), owner, owner), None);
    }

    fn messages_query(uri: &str) -> GetMessagesQuery {
        let uri: axum::http::Uri = uri.parse().unwrap();
        Query::<GetMessagesQuery>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn cursor_pages_on_timestamp_and_id() {
        let id = Uuid::new_v4();
        let query = messages_query(&format!(
            "/orders/x/messages?after=2025-09-01T10:00:00Z&after_id={id}"
        ));
        let (after, after_id) = query.cursor().unwrap().unwrap();
        assert_eq!(after.to_rfc3339(), "2025-09-01T10:00:00+00:00");
        assert_eq!(after_id, Some(id));

        let query = messages_query("/orders/x/messages?after=2025-09-01T10:00:00Z");
        assert_eq!(query.cursor().unwrap().unwrap().1, None);
        assert!(messages_query("/orders/x/messages").cursor().unwrap().is_none());
    }

    #[test]
    fn cursor_id_without_timestamp_is_rejected() {
        let query = messages_query(&format!("/orders/x/messages?after_id={}", Uuid::nil()));
        assert!(matches!(query.cursor(), Err(AppError::BadRequest(_))));
    }
}
