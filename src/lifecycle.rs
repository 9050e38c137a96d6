//! Order lifecycle: the canonical status set, the pipelines each order type
//! walks through, and the pure transition function every route goes through.

use std::{fmt, str::FromStr};

use diesel::{
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    pg::{Pg, PgValue},
    serialize::{self, Output, ToSql},
    sql_types::Text,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Role;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseVocabularyError {
    kind: &'static str,
    value: String,
}

/// Canonical order status. `received` and `started` are accepted as input
/// aliases of `new` and `processing`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    ToSchema,
    AsExpression,
    FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[serde(alias = "received")]
    New,
    Confirmed,
    #[serde(alias = "started")]
    Processing,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::New,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Ready,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseVocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" | "received" => Ok(OrderStatus::New),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" | "started" => Ok(OrderStatus::Processing),
            "ready" => Ok(OrderStatus::Ready),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(ParseVocabularyError {
                kind: "order status",
                value: other.to_string(),
            }),
        }
    }
}

/// Canonical order type. Files uploaded ahead of time are `digital`,
/// counter jobs are `walk-in`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
pub enum OrderType {
    #[serde(rename = "digital", alias = "uploaded-files", alias = "uploaded_files")]
    Digital,
    #[serde(rename = "walk-in", alias = "walkin", alias = "walk_in")]
    WalkIn,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Digital => "digital",
            OrderType::WalkIn => "walk-in",
        }
    }

    /// Stages an order of this type passes through, in order.
    pub fn pipeline(self) -> &'static [OrderStatus] {
        match self {
            OrderType::Digital => &[
                OrderStatus::New,
                OrderStatus::Confirmed,
                OrderStatus::Processing,
                OrderStatus::Ready,
                OrderStatus::Completed,
            ],
            OrderType::WalkIn => &[
                OrderStatus::New,
                OrderStatus::Processing,
                OrderStatus::Completed,
            ],
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = ParseVocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "digital" | "uploaded-files" | "uploaded_files" => Ok(OrderType::Digital),
            "walk-in" | "walkin" | "walk_in" => Ok(OrderType::WalkIn),
            other => Err(ParseVocabularyError {
                kind: "order type",
                value: other.to_string(),
            }),
        }
    }
}

macro_rules! text_sql_mapping {
    ($ty:ty) => {
        impl ToSql<Text, Pg> for $ty {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
            }
        }

        impl FromSql<Text, Pg> for $ty {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                Ok(raw.parse::<$ty>()?)
            }
        }
    };
}

text_sql_mapping!(OrderStatus);
text_sql_mapping!(OrderType);

/// The status the advance action moves to, or `None` when the order is
/// terminal. Statuses off the type's pipeline move to the next stage of
/// higher rank, so the table stays forward-only.
pub fn next_status(order_type: OrderType, status: OrderStatus) -> Option<OrderStatus> {
    if status.is_terminal() {
        return None;
    }
    order_type
        .pipeline()
        .iter()
        .copied()
        .find(|stage| *stage > status)
}

/// Button label for advancing into `target`. `New` is never a target and
/// `Cancelled` is reached through the cancel action only.
pub fn advance_label(target: OrderStatus) -> Option<&'static str> {
    match target {
        OrderStatus::Confirmed => Some("Confirm order"),
        OrderStatus::Processing => Some("Start printing"),
        OrderStatus::Ready => Some("Mark ready"),
        OrderStatus::Completed => Some("Complete order"),
        OrderStatus::New | OrderStatus::Cancelled => None,
    }
}

/// Whether `role` may cancel an order currently in `status`. Customers can
/// only withdraw an order the shop has not picked up yet.
pub fn can_cancel(role: Role, status: OrderStatus) -> bool {
    match role {
        _ if status.is_terminal() => false,
        Role::Customer => status == OrderStatus::New,
        Role::ShopOwner | Role::Admin => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderState {
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub is_urgent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    Advance,
    Cancel,
    ToggleUrgent,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("order is already {0}")]
    Terminal(OrderStatus),
}

/// Applies `action` to `state`. Urgency can be toggled in any status.
pub fn apply(state: OrderState, action: OrderAction) -> Result<OrderState, LifecycleError> {
    match action {
        OrderAction::Advance => {
            let status = next_status(state.order_type, state.status)
                .ok_or(LifecycleError::Terminal(state.status))?;
            Ok(OrderState { status, ..state })
        }
        OrderAction::Cancel => {
            if state.status.is_terminal() {
                return Err(LifecycleError::Terminal(state.status));
            }
            Ok(OrderState {
                status: OrderStatus::Cancelled,
                ..state
            })
        }
        OrderAction::ToggleUrgent => Ok(OrderState {
            is_urgent: !state.is_urgent,
            ..state
        }),
    }
}

/// The advance action a client should offer, if any.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct NextAction {
    pub to: OrderStatus,
    pub label: &'static str,
}

impl NextAction {
    pub fn for_order(order_type: OrderType, status: OrderStatus) -> Option<Self> {
        let to = next_status(order_type, status)?;
        advance_label(to).map(|label| NextAction { to, label })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(order_type: OrderType, status: OrderStatus) -> OrderState {
        OrderState {
            order_type,
            status,
            is_urgent: false,
        }
    }

    #[test]
    fn walk_in_follows_received_started_completed() {
        let received: OrderStatus = "received".parse().unwrap();
        let started = apply(state(OrderType::WalkIn, received), OrderAction::Advance).unwrap();
        assert_eq!(started.status, "started".parse::<OrderStatus>().unwrap());

        let completed = apply(started, OrderAction::Advance).unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);

        assert_eq!(
            apply(completed, OrderAction::Advance),
            Err(LifecycleError::Terminal(OrderStatus::Completed))
        );
        assert_eq!(NextAction::for_order(OrderType::WalkIn, completed.status), None);
    }

    #[test]
    fn digital_walks_full_pipeline() {
        let mut current = state(OrderType::Digital, OrderStatus::New);
        let mut seen = vec![current.status];
        while let Ok(next) = apply(current, OrderAction::Advance) {
            current = next;
            seen.push(current.status);
        }
        assert_eq!(seen, OrderType::Digital.pipeline());
    }

    #[test]
    fn terminal_statuses_offer_no_advance() {
        for order_type in [OrderType::Digital, OrderType::WalkIn] {
            for status in [OrderStatus::Completed, OrderStatus::Cancelled] {
                assert_eq!(next_status(order_type, status), None);
                assert!(NextAction::for_order(order_type, status).is_none());
            }
        }
    }

    #[test]
    fn advance_never_moves_backwards_or_into_cancelled() {
        for order_type in [OrderType::Digital, OrderType::WalkIn] {
            for status in OrderStatus::ALL {
                if let Some(next) = next_status(order_type, status) {
                    assert!(next > status);
                    assert_ne!(next, OrderStatus::Cancelled);
                }
            }
        }
    }

    #[test]
    fn off_pipeline_status_moves_to_next_stage() {
        assert_eq!(
            next_status(OrderType::WalkIn, OrderStatus::Confirmed),
            Some(OrderStatus::Processing)
        );
        assert_eq!(
            next_status(OrderType::WalkIn, OrderStatus::Ready),
            Some(OrderStatus::Completed)
        );
    }

    #[test]
    fn cancel_reachable_from_every_non_terminal_status() {
        for status in OrderStatus::ALL.into_iter().filter(|s| !s.is_terminal()) {
            let cancelled = apply(state(OrderType::Digital, status), OrderAction::Cancel).unwrap();
            assert_eq!(cancelled.status, OrderStatus::Cancelled);
        }
        assert!(apply(state(OrderType::Digital, OrderStatus::Completed), OrderAction::Cancel).is_err());
        assert!(apply(state(OrderType::Digital, OrderStatus::Cancelled), OrderAction::Cancel).is_err());
    }

    #[test]
    fn urgency_toggle_twice_restores_flag() {
        let original = state(OrderType::WalkIn, OrderStatus::New);
        let urgent = apply(original, OrderAction::ToggleUrgent).unwrap();
        assert!(urgent.is_urgent);
        assert_eq!(urgent.status, original.status);
        let back = apply(urgent, OrderAction::ToggleUrgent).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn customers_only_cancel_new_orders() {
        assert!(can_cancel(Role::Customer, OrderStatus::New));
        assert!(!can_cancel(Role::Customer, OrderStatus::Confirmed));
        assert!(can_cancel(Role::ShopOwner, OrderStatus::Ready));
        assert!(!can_cancel(Role::ShopOwner, OrderStatus::Completed));
        assert!(!can_cancel(Role::Admin, OrderStatus::Cancelled));
    }

    #[test]
    fn legacy_vocabulary_deserializes_to_canonical() {
        let status: OrderStatus = serde_json::from_str("\"started\"").unwrap();
        assert_eq!(status, OrderStatus::Processing);
        let order_type: OrderType = serde_json::from_str("\"uploaded-files\"").unwrap();
        assert_eq!(order_type, OrderType::Digital);
        let order_type: OrderType = serde_json::from_str("\"walkin\"").unwrap();
        assert_eq!(order_type, OrderType::WalkIn);
        assert_eq!(serde_json::to_string(&OrderType::WalkIn).unwrap(), "\"walk-in\"");
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn labels_follow_target_status() {
        let action = NextAction::for_order(OrderType::Digital, OrderStatus::Processing).unwrap();
        assert_eq!(action.to, OrderStatus::Ready);
        assert_eq!(action.label, "Mark ready");
    }

    #[test]
    fn every_pipeline_target_has_a_label() {
        for order_type in [OrderType::Digital, OrderType::WalkIn] {
            for status in OrderStatus::ALL {
                if let Some(to) = next_status(order_type, status) {
                    assert!(advance_label(to).is_some(), "{to} has no label");
                }
            }
        }
        assert_eq!(advance_label(OrderStatus::New), None);
        assert_eq!(advance_label(OrderStatus::Cancelled), None);
    }
}
