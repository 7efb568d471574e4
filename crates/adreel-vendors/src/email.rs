//! Transactional email client.
//!
//! Invitation emails go out through an HTTP email vendor. The client only
//! needs one call shape: POST /emails with a from/to/subject/html body,
//! Bearer-authenticated.

use adreel_models::invitation::TeamInvitation;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{VendorError, VendorResult};

const DEFAULT_BASE_URL: &str = "https://api.resend.com";
const DEFAULT_FROM: &str = "AdReel <invitations@adreel.app>";

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

/// Client for the transactional email vendor.
pub struct EmailClient {
    api_key: String,
    base_url: String,
    from_address: String,
    client: Client,
}

impl EmailClient {
    /// Create a new client from the environment.
    pub fn new() -> VendorResult<Self> {
        let api_key = std::env::var("EMAIL_API_KEY")
            .map_err(|_| VendorError::config_error("EMAIL_API_KEY not set"))?;
        let base_url =
            std::env::var("EMAIL_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let from_address =
            std::env::var("EMAIL_FROM").unwrap_or_else(|_| DEFAULT_FROM.to_string());

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            from_address,
            client: Client::new(),
        })
    }

    /// Create a client with an explicit key and API base (used in tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            from_address: DEFAULT_FROM.to_string(),
            client: Client::new(),
        }
    }

    /// Send one email. Returns the vendor's message id.
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> VendorResult<String> {
        let url = format!("{}/emails", self.base_url);
        let request = SendRequest {
            from: &self.from_address,
            to: vec![to],
            subject,
            html,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VendorError::from_status(status, error_text));
        }

        let body: SendResponse = response
            .json()
            .await
            .map_err(|e| VendorError::invalid_response(format!("Bad send body: {}", e)))?;

        debug!(message_id = %body.id, "Sent email");
        Ok(body.id)
    }

    /// Compose and send a team invitation email.
    pub async fn send_invitation(
        &self,
        invitation: &TeamInvitation,
        accept_url: &str,
    ) -> VendorResult<String> {
        let (subject, html) = invitation_email(invitation, accept_url);
        self.send(&invitation.email, &subject, &html).await
    }
}

/// Build the subject and HTML body for an invitation email.
pub fn invitation_email(invitation: &TeamInvitation, accept_url: &str) -> (String, String) {
    let subject = format!("You've been invited to join {} on AdReel", invitation.team_name);
    let html = format!(
        "<h2>Join {team} on AdReel</h2>\
         <p>You've been invited to join <strong>{team}</strong> as a {role}.</p>\
         <p><a href=\"{url}\">Accept invitation</a></p>\
         <p>This invitation expires on {expires}.</p>",
        team = invitation.team_name,
        role = invitation.role.as_str(),
        url = accept_url,
        expires = invitation.expires_at.format("%B %-d, %Y"),
    );
    (subject, html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::team::{TeamId, TeamRole};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn invitation() -> TeamInvitation {
        TeamInvitation::new(
            TeamId::from("team-1"),
            "Acme Studio",
            "Invitee@Example.COM",
            TeamRole::Member,
            "user-owner",
        )
    }

    #[test]
    fn test_invitation_email_content() {
        let inv = invitation();
        let (subject, html) = invitation_email(&inv, "https://app.adreel.app/invitations/abc");

        assert!(subject.contains("Acme Studio"));
        assert!(html.contains("Acme Studio"));
        assert!(html.contains("member"));
        assert!(html.contains("https://app.adreel.app/invitations/abc"));
    }

    #[tokio::test]
    async fn test_send_invitation_posts_to_vendor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({ "to": ["invitee@example.com"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "email-1" })))
            .mount(&server)
            .await;

        let client = EmailClient::with_base_url("test-key", server.uri());
        let id = client
            .send_invitation(&invitation(), "https://app.adreel.app/invitations/abc")
            .await
            .unwrap();
        assert_eq!(id, "email-1");
    }

    #[tokio::test]
    async fn test_vendor_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid from"))
            .mount(&server)
            .await;

        let client = EmailClient::with_base_url("test-key", server.uri());
        let err = client.send("a@b.c", "s", "<p>x</p>").await.unwrap_err();
        match err {
            VendorError::RequestFailed { status, .. } => assert_eq!(status, 422),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
