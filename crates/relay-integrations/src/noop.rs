//! Permissive default implementations for standalone operation.
//!
//! `OpenIdentity` accepts every key; the rest allow everything and log at
//! debug so a gateway can run without any persistence wired up.

use crate::traits::{
    Activity, ActivityEntry, Billing, ChatHistory, Entitlement, HistoryMessage, Identity,
    PlanDecision, TrialGate, TrialStatus, UserAccount,
};
use async_trait::async_trait;
use relay_core::{EnvironmentTag, GatewayError, UsageRecord};
use tracing::debug;

/// Identity source that accepts every key as a live, funded account
pub struct OpenIdentity;

#[async_trait]
impl Identity for OpenIdentity {
    async fn get_user_by_key(&self, api_key: &str) -> Result<Option<UserAccount>, GatewayError> {
        Ok(Some(UserAccount {
            id: format!("user-{:x}", fxhash(api_key)),
            credits: f64::MAX,
            environment: EnvironmentTag::Live,
        }))
    }
}

/// Small stable hash so the synthetic user id is deterministic per key
fn fxhash(s: &str) -> u64 {
    s.bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        })
}

/// Entitlement that always allows
pub struct NoopEntitlement;

#[async_trait]
impl Entitlement for NoopEntitlement {
    async fn check_plan_limits(
        &self,
        _user_id: &str,
        _tokens: u64,
        _environment: EnvironmentTag,
    ) -> Result<PlanDecision, GatewayError> {
        Ok(PlanDecision::allowed())
    }
}

/// Trial gate that treats every key as non-trial
pub struct NoopTrialGate;

#[async_trait]
impl TrialGate for NoopTrialGate {
    async fn validate_access(&self, _api_key: &str) -> Result<TrialStatus, GatewayError> {
        Ok(TrialStatus::not_trial())
    }

    async fn track_usage(
        &self,
        _api_key: &str,
        _tokens: u64,
        _requests: u64,
    ) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Billing sink that logs and discards
pub struct NoopBilling;

#[async_trait]
impl Billing for NoopBilling {
    async fn deduct_credits(
        &self,
        _api_key: &str,
        cost: f64,
        description: &str,
        _metadata: serde_json::Value,
    ) -> Result<(), GatewayError> {
        debug!(cost, description, "deduct_credits (noop)");
        Ok(())
    }

    async fn record_usage(
        &self,
        user_id: &str,
        _api_key: &str,
        record: &UsageRecord,
    ) -> Result<(), GatewayError> {
        debug!(
            user_id,
            tokens = record.total_tokens,
            provider = %record.provider,
            "record_usage (noop)"
        );
        Ok(())
    }
}

/// Activity sink that logs and discards
pub struct NoopActivity;

#[async_trait]
impl Activity for NoopActivity {
    async fn log(&self, entry: ActivityEntry) -> Result<(), GatewayError> {
        debug!(
            user_id = %entry.user_id,
            model = %entry.model,
            provider = %entry.provider,
            tokens = entry.tokens,
            "activity (noop)"
        );
        Ok(())
    }
}

/// Chat history with no persistence
pub struct NoopChatHistory;

#[async_trait]
impl ChatHistory for NoopChatHistory {
    async fn get(
        &self,
        _session_id: i64,
        _user_id: &str,
    ) -> Result<Option<Vec<HistoryMessage>>, GatewayError> {
        Ok(None)
    }

    async fn save(
        &self,
        _session_id: i64,
        _user_id: &str,
        _role: &str,
        _content: &str,
        _model: &str,
        _tokens: u32,
    ) -> Result<(), GatewayError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_identity_is_deterministic() {
        let identity = OpenIdentity;
        let a = identity.get_user_by_key("sk-1").await.unwrap().unwrap();
        let b = identity.get_user_by_key("sk-1").await.unwrap().unwrap();
        let c = identity.get_user_by_key("sk-2").await.unwrap().unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn test_noop_trial_is_not_trial() {
        let status = NoopTrialGate.validate_access("sk-1").await.unwrap();
        assert!(!status.is_trial);
        assert!(status.is_valid);
    }
}
