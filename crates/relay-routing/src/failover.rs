//! Failover chain construction.
//!
//! The chain is a pure function of the first-choice provider: no I/O, no
//! randomness. Providers outside the eligible set never fail over; their
//! failure modes are not comparable to the pooled providers (a caller that
//! explicitly trusts one endpoint must not be silently rerouted).

/// Fixed global priority order for fail-over-eligible providers
pub const FALLBACK_PROVIDER_PRIORITY: [&str; 9] = [
    "huggingface",
    "featherless",
    "vercel-ai-gateway",
    "aihubmix",
    "anannas",
    "fireworks",
    "together",
    "google-vertex",
    "openrouter",
];

/// Provider every chain terminates in
pub const UNIVERSAL_FALLBACK: &str = "openrouter";

/// Whether a provider participates in silent failover
#[must_use]
pub fn is_failover_eligible(provider: &str) -> bool {
    FALLBACK_PROVIDER_PRIORITY.contains(&provider)
}

/// Build the ordered provider attempt list for one request.
///
/// - Empty first provider: the chain is just the universal fallback.
/// - Non-eligible first provider: the singleton chain `[first]`.
/// - Otherwise: `first` followed by every other eligible provider in
///   priority order, deduplicated, with the universal fallback guaranteed
///   present.
#[must_use]
pub fn build_failover_chain(first_provider: &str) -> Vec<String> {
    let provider = first_provider.to_ascii_lowercase();

    if provider.is_empty() {
        return vec![UNIVERSAL_FALLBACK.to_string()];
    }

    if !is_failover_eligible(&provider) {
        return vec![provider];
    }

    let mut chain = vec![provider];
    for candidate in FALLBACK_PROVIDER_PRIORITY {
        if !chain.iter().any(|p| p == candidate) {
            chain.push(candidate.to_string());
        }
    }

    if !chain.iter().any(|p| p == UNIVERSAL_FALLBACK) {
        chain.push(UNIVERSAL_FALLBACK.to_string());
    }

    chain
}
