//! Collaborator trait definitions.
//!
//! All traits are dyn-safe async interfaces. Failures from these
//! collaborators are logged and swallowed by the orchestrator; they never
//! cause a successfully generated completion to be withheld.

use async_trait::async_trait;
use relay_core::{EnvironmentTag, GatewayError, UsageRecord};
use serde::{Deserialize, Serialize};

/// A resolved user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    /// Stable user id
    pub id: String,
    /// Remaining credit balance in USD
    pub credits: f64,
    /// Environment the key operates in
    pub environment: EnvironmentTag,
}

/// Outcome of a plan limit check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDecision {
    /// Whether the usage is within plan limits
    pub allowed: bool,
    /// Reason when denied
    pub reason: Option<String>,
}

impl PlanDecision {
    /// An allowing decision
    #[must_use]
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    /// A denying decision
    #[must_use]
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Trial entitlement status for a key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialStatus {
    /// Whether the key is a trial key
    pub is_trial: bool,
    /// Whether access is currently permitted
    pub is_valid: bool,
    /// Whether the trial has expired
    pub is_expired: bool,
    /// Error message when invalid
    pub error: Option<String>,
    /// Remaining trial tokens, when known
    pub remaining_tokens: Option<u64>,
    /// Remaining trial requests, when known
    pub remaining_requests: Option<u64>,
    /// Trial end date (ISO 8601), when known
    pub trial_end_date: Option<String>,
}

impl TrialStatus {
    /// A non-trial, fully valid status
    #[must_use]
    pub fn not_trial() -> Self {
        Self {
            is_trial: false,
            is_valid: true,
            ..Self::default()
        }
    }
}

/// One activity log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// User the activity belongs to
    pub user_id: String,
    /// Model requested by the caller
    pub model: String,
    /// Provider that served the request
    pub provider: String,
    /// Total tokens billed
    pub tokens: u32,
    /// Cost in USD
    pub cost: f64,
    /// Tokens per second over the request
    pub speed: f64,
    /// Finish reason string
    pub finish_reason: String,
    /// Endpoint, stream flag, session id and friends
    pub metadata: serde_json::Value,
}

/// One message from stored chat history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Message role
    pub role: String,
    /// Message text
    pub content: String,
}

/// Key-to-user resolution
#[async_trait]
pub trait Identity: Send + Sync {
    /// Look up the account an API key belongs to
    ///
    /// # Errors
    /// Returns an error when the backing store is unreachable.
    async fn get_user_by_key(&self, api_key: &str) -> Result<Option<UserAccount>, GatewayError>;
}

/// Plan limit enforcement
#[async_trait]
pub trait Entitlement: Send + Sync {
    /// Check whether the user's plan permits the tokens consumed so far
    ///
    /// # Errors
    /// Returns an error when the backing store is unreachable.
    async fn check_plan_limits(
        &self,
        user_id: &str,
        tokens: u64,
        environment: EnvironmentTag,
    ) -> Result<PlanDecision, GatewayError>;
}

/// Trial plan validation and usage tracking
#[async_trait]
pub trait TrialGate: Send + Sync {
    /// Validate trial access for a key
    ///
    /// # Errors
    /// Returns an error when the backing store is unreachable.
    async fn validate_access(&self, api_key: &str) -> Result<TrialStatus, GatewayError>;

    /// Record trial usage after a response
    ///
    /// # Errors
    /// Returns an error when the backing store is unreachable.
    async fn track_usage(
        &self,
        api_key: &str,
        tokens: u64,
        requests: u64,
    ) -> Result<(), GatewayError>;
}

/// Credit deduction and usage recording
#[async_trait]
pub trait Billing: Send + Sync {
    /// Deduct credits for a completed request
    ///
    /// # Errors
    /// Returns an error when the deduction fails; a `Validation` error
    /// signals insufficient funds detected atomically in the store.
    async fn deduct_credits(
        &self,
        api_key: &str,
        cost: f64,
        description: &str,
        metadata: serde_json::Value,
    ) -> Result<(), GatewayError>;

    /// Record a finalized usage tuple
    ///
    /// # Errors
    /// Returns an error when the backing store is unreachable.
    async fn record_usage(
        &self,
        user_id: &str,
        api_key: &str,
        record: &UsageRecord,
    ) -> Result<(), GatewayError>;
}

/// Activity feed logging
#[async_trait]
pub trait Activity: Send + Sync {
    /// Append an activity entry
    ///
    /// # Errors
    /// Returns an error when the backing store is unreachable.
    async fn log(&self, entry: ActivityEntry) -> Result<(), GatewayError>;
}

/// Chat session persistence
#[async_trait]
pub trait ChatHistory: Send + Sync {
    /// Messages of a session, oldest first; `None` when the session does
    /// not exist or belongs to another user
    ///
    /// # Errors
    /// Returns an error when the backing store is unreachable.
    async fn get(
        &self,
        session_id: i64,
        user_id: &str,
    ) -> Result<Option<Vec<HistoryMessage>>, GatewayError>;

    /// Append one message to a session
    ///
    /// # Errors
    /// Returns an error when the backing store is unreachable.
    async fn save(
        &self,
        session_id: i64,
        user_id: &str,
        role: &str,
        content: &str,
        model: &str,
        tokens: u32,
    ) -> Result<(), GatewayError>;
}
