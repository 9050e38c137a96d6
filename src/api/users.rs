use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_error::{AppError, StdResponse};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Fetches the profile used to snapshot a customer's contact details onto an order.
pub async fn get_user_profile(
    client: &Client,
    base_url: &str,
    id: Uuid,
) -> Result<UserProfile, AppError> {
    let response = client
        .get(format!("{}/users/{}", base_url, id))
        .send()
        .await
        .map_err(|_| AppError::ServiceUnreachable("UserService".into()))?;

    let empty = || UserProfile {
        id,
        ..Default::default()
    };

    // No profile yet: the order falls back to the contact details in the request.
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(empty());
    }

    let profile: StdResponse<UserProfile, String> = response
        .error_for_status()
        .map_err(|_| AppError::ServiceUnreachable("UserService".into()))?
        .json()
        .await
        .context("Failed to parse JSON")?;

    Ok(profile.data.unwrap_or_else(empty))
}

/// Trims a contact field and drops it when nothing is left.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Contact snapshot stored on the order: explicit values win over the profile.
pub fn contact_snapshot(
    profile: &UserProfile,
    name: Option<String>,
    phone: Option<String>,
) -> (Option<String>, Option<String>) {
    (
        non_blank(name).or_else(|| non_blank(profile.name.clone())),
        non_blank(phone).or_else(|| non_blank(profile.phone.clone())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_contact_overrides_profile() {
        let profile = UserProfile {
            id: Uuid::new_v4(),
            name: Some("Ama".into()),
            phone: Some("+233 20 000 0000".into()),
            email: None,
        };
        let (name, phone) = contact_snapshot(&profile, Some("Kofi".into()), Some("  ".into()));
        assert_eq!(name.as_deref(), Some("Kofi"));
        assert_eq!(phone.as_deref(), Some("+233 20 000 0000"));
    }

    #[test]
    fn blank_contact_fields_are_dropped() {
        assert_eq!(non_blank(Some("  Esi ".into())).as_deref(), Some("Esi"));
        assert_eq!(non_blank(Some(" \t ".into())), None);
        assert_eq!(non_blank(None), None);
    }

    #[tokio::test]
    async fn unknown_user_yields_an_empty_profile() {
        let stub = axum::Router::new().route(
            "/users/{id}",
            axum::routing::get(|| async { axum::http::StatusCode::NOT_FOUND }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, stub).await.unwrap() });

        let id = Uuid::new_v4();
        let profile = get_user_profile(&Client::new(), &format!("http://{addr}"), id)
            .await
            .unwrap();
        assert_eq!(profile.id, id);
        assert!(profile.name.is_none());
        assert!(profile.phone.is_none());
    }

    #[test]
    fn missing_profile_fields_stay_empty() {
        let profile = UserProfile::default();
        assert_eq!(contact_snapshot(&profile, None, None), (None, None));
    }
}
