//! Premium upgrade flow.
//!
//! Checkout happens on an external page; nothing comes back synchronously.
//! Premium is granted only when a confirmation arrives out of band (a user
//! prompt today, a payment webhook or poll in a hosted deployment).

use crate::entitlement::EntitlementStore;
use std::sync::Arc;

pub struct UpgradeFlow {
    checkout_url: String,
    store: Arc<dyn EntitlementStore>,
}

impl UpgradeFlow {
    pub fn new(checkout_url: impl Into<String>, store: Arc<dyn EntitlementStore>) -> Self {
        Self {
            checkout_url: checkout_url.into(),
            store,
        }
    }

    /// Checkout page the presentation layer should open.
    pub fn checkout_url(&self) -> &str {
        &self.checkout_url
    }

    /// Record that the user was sent to checkout.
    pub fn begin(&self) -> &str {
        tracing::info!(
            url = %self.checkout_url,
            already_premium = self.store.is_premium(),
            "checkout opened"
        );
        &self.checkout_url
    }

    /// Apply a payment confirmation. Returns whether premium is active.
    pub fn confirm(&self, confirmed: bool) -> bool {
        if confirmed {
            self.store.mark_premium();
            tracing::info!("premium activated");
        } else {
            tracing::info!("upgrade not confirmed");
        }
        self.store.is_premium()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::MemoryEntitlements;

    #[test]
    fn test_unconfirmed_upgrade_grants_nothing() {
        let store = Arc::new(MemoryEntitlements::with_flags(true, false));
        let flow = UpgradeFlow::new("https://pay.example/checkout", store.clone());
        assert_eq!(flow.begin(), "https://pay.example/checkout");
        assert!(!flow.confirm(false));
        assert!(!store.can_start_analysis());
    }

    #[test]
    fn test_confirmed_upgrade_unblocks_expired_trial() {
        let store = Arc::new(MemoryEntitlements::with_flags(true, false));
        let flow = UpgradeFlow::new("https://pay.example/checkout", store.clone());
        assert!(flow.confirm(true));
        assert!(flow.confirm(true));
        assert!(store.can_start_analysis());
        assert!(store.has_used_free_trial());
    }
}
