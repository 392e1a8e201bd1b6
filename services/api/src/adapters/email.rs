//! services/api/src/adapters/email.rs
//!
//! This module contains the adapter for the outbound mail collaborator.
//! It implements the `EmailService` port from the `core` crate by posting
//! JSON to a transactional-mail HTTP endpoint.

use async_trait::async_trait;
use course_admin_core::domain::{Candidate, Course};
use course_admin_core::ports::{EmailService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `EmailService` against an HTTP mail API.
#[derive(Clone)]
pub struct HttpMailAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from_address: String,
}

impl HttpMailAdapter {
    /// Creates a new `HttpMailAdapter`.
    pub fn new(
        client: reqwest::Client,
        endpoint: String,
        api_key: Option<String>,
        from_address: String,
    ) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            from_address,
        }
    }

    async fn post_message(&self, to: &str, subject: &str, text: &str) -> PortResult<()> {
        let body = serde_json::json!({
            "from": self.from_address,
            "to": to,
            "subject": subject,
            "text": text,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "mail endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

//=========================================================================================
// `EmailService` Trait Implementation
//=========================================================================================

#[async_trait]
impl EmailService for HttpMailAdapter {
    /// Sends the post-activation welcome message carrying the candidate's
    /// group and, for clinical roles, their candidate number.
    async fn send_welcome_email(&self, candidate: &Candidate, course: &Course) -> PortResult<()> {
        let group = candidate
            .assigned_group
            .map(|g| g.to_string())
            .unwrap_or_else(|| "-".to_string());
        let text = match candidate.candidate_number {
            Some(number) => format!(
                "Dear {},\n\nYour place on {} is confirmed. You are candidate \
                 number {} in group {}.\n\nThe General Office",
                candidate.full_name, course.name, number, group
            ),
            None => format!(
                "Dear {},\n\nYour place on {} is confirmed. You will be observing \
                 with group {}.\n\nThe General Office",
                candidate.full_name, course.name, group
            ),
        };
        self.post_message(
            &candidate.email,
            &format!("Welcome to {}", course.name),
            &text,
        )
        .await
    }

    /// Sends payment instructions when an application is approved.
    async fn send_payment_request(
        &self,
        candidate: &Candidate,
        course: &Course,
    ) -> PortResult<()> {
        let text = format!(
            "Dear {},\n\nYour application to {} has been approved. Please \
             complete payment to secure your place.\n\nThe General Office",
            candidate.full_name, course.name
        );
        self.post_message(
            &candidate.email,
            &format!("{}: payment required", course.name),
            &text,
        )
        .await
    }
}
