//! # Relay Integrations
//!
//! External collaborator interfaces the gateway core calls as black
//! boxes: identity, entitlements, trials, billing, activity logging and
//! chat history. The core makes no assumption about their storage
//! technology; implementations live with the deployment.
//!
//! `noop` provides permissive defaults for standalone operation; `memory`
//! provides recording fakes used by tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod memory;
pub mod noop;
pub mod traits;

pub use memory::{MemoryBilling, MemoryChatHistory, MemoryTrialGate};
pub use noop::{
    NoopActivity, NoopBilling, NoopChatHistory, NoopEntitlement, NoopTrialGate, OpenIdentity,
};
pub use traits::{
    Activity, ActivityEntry, Billing, ChatHistory, Entitlement, HistoryMessage, Identity,
    PlanDecision, TrialGate, TrialStatus, UserAccount,
};
