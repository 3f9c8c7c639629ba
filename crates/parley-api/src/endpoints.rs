//! Endpoint wrappers.
//!
//! One method per service endpoint, each a one-liner over
//! [`ApiClient::call`]. Payloads stay opaque `Value`s.

use std::fmt::Display;

use reqwest::Method;
use serde_json::{json, Value};

use crate::client::ApiClient;
use crate::errors::ApiError;

impl ApiClient {
    /// `GET /auth/user/`
    pub async fn get_current_user(&self) -> Result<Value, ApiError> {
        self.call(Method::GET, "/auth/user/", None).await
    }

    // ─── Tasks ───────────────────────────────────────────────────────────

    /// `GET /tasks/`
    pub async fn get_tasks(&self) -> Result<Value, ApiError> {
        self.call(Method::GET, "/tasks/", None).await
    }

    /// `GET /tasks/{id}/`
    pub async fn get_task(&self, id: impl Display) -> Result<Value, ApiError> {
        self.call(Method::GET, &format!("/tasks/{id}/"), None).await
    }

    /// `POST /tasks/`
    pub async fn create_task(&self, data: &Value) -> Result<Value, ApiError> {
        self.call(Method::POST, "/tasks/", Some(data)).await
    }

    /// `PUT /tasks/{id}/`
    pub async fn update_task(&self, id: impl Display, data: &Value) -> Result<Value, ApiError> {
        self.call(Method::PUT, &format!("/tasks/{id}/"), Some(data))
            .await
    }

    /// `POST /tasks/{id}/withdraw/`
    pub async fn withdraw_task(
        &self,
        id: impl Display,
        reason: &str,
    ) -> Result<Value, ApiError> {
        self.call(
            Method::POST,
            &format!("/tasks/{id}/withdraw/"),
            Some(&json!({ "reason": reason })),
        )
        .await
    }

    /// `POST /tasks/{id}/approve/`
    pub async fn approve_task(&self, id: impl Display) -> Result<Value, ApiError> {
        self.call(Method::POST, &format!("/tasks/{id}/approve/"), None)
            .await
    }

    /// `POST /tasks/{id}/request-revision/`
    pub async fn request_revision(
        &self,
        id: impl Display,
        feedback: &str,
    ) -> Result<Value, ApiError> {
        self.call(
            Method::POST,
            &format!("/tasks/{id}/request-revision/"),
            Some(&json!({ "feedback": feedback })),
        )
        .await
    }

    // ─── Budget negotiation ──────────────────────────────────────────────

    /// `POST /tasks/{id}/accept-budget/`
    pub async fn accept_budget(&self, id: impl Display) -> Result<Value, ApiError> {
        self.call(Method::POST, &format!("/tasks/{id}/accept-budget/"), None)
            .await
    }

    /// `POST /tasks/{id}/counter-budget/`
    pub async fn counter_budget(
        &self,
        id: impl Display,
        amount: f64,
        reason: &str,
    ) -> Result<Value, ApiError> {
        self.call(
            Method::POST,
            &format!("/tasks/{id}/counter-budget/"),
            Some(&json!({ "amount": amount, "reason": reason })),
        )
        .await
    }

    /// `POST /tasks/{id}/reject-budget/`
    pub async fn reject_budget(&self, id: impl Display) -> Result<Value, ApiError> {
        self.call(Method::POST, &format!("/tasks/{id}/reject-budget/"), None)
            .await
    }

    // ─── Chat ────────────────────────────────────────────────────────────

    /// `GET /tasks/{task_id}/chat/`
    pub async fn get_messages(&self, task_id: impl Display) -> Result<Value, ApiError> {
        self.call(Method::GET, &format!("/tasks/{task_id}/chat/"), None)
            .await
    }

    /// `POST /tasks/{task_id}/chat/`
    pub async fn send_message(
        &self,
        task_id: impl Display,
        message: &Value,
    ) -> Result<Value, ApiError> {
        self.call(
            Method::POST,
            &format!("/tasks/{task_id}/chat/"),
            Some(message),
        )
        .await
    }

    // ─── Notifications ───────────────────────────────────────────────────

    /// `GET /notifications/`
    pub async fn get_notifications(&self) -> Result<Value, ApiError> {
        self.call(Method::GET, "/notifications/", None).await
    }

    /// `POST /notifications/{id}/read/`
    pub async fn mark_notification_read(&self, id: impl Display) -> Result<Value, ApiError> {
        self.call(Method::POST, &format!("/notifications/{id}/read/"), None)
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
