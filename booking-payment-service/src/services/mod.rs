pub mod cash;
pub mod gateway;
pub mod memory_store;
pub mod metrics;
pub mod notifier;
pub mod payments;
pub mod refund;
pub mod repository;
pub mod settlement;
pub mod store;
pub mod wallet;

use std::sync::Arc;

pub use cash::{CashCollection, CashInitiation};
pub use gateway::{PaymentGateway, RazorpayGateway};
pub use memory_store::InMemoryPaymentStore;
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{NotificationDispatcher, Notifier};
pub use payments::PaymentEngine;
pub use refund::RefundEngine;
pub use repository::PaymentRepository;
pub use settlement::{PricingPolicy, SettlementEngine};
pub use store::PaymentStore;
pub use wallet::WalletLedger;

use crate::config::Config;

/// Every engine wired over one store, gateway and notifier.
#[derive(Clone)]
pub struct PaymentServices {
    pub payments: PaymentEngine,
    pub cash: CashCollection,
    pub settlement: SettlementEngine,
    pub wallet: WalletLedger,
}

impl PaymentServices {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: NotificationDispatcher,
        config: &Config,
    ) -> Self {
        let policy = PricingPolicy::from(&config.pricing);
        let wallet = WalletLedger::new(store.clone(), config.cash.default_cash_limit);
        let refunds = RefundEngine::new(
            store.clone(),
            gateway.clone(),
            wallet.clone(),
            notifier.clone(),
        );

        Self {
            payments: PaymentEngine::new(
                store.clone(),
                gateway,
                wallet.clone(),
                refunds,
                policy.clone(),
                notifier.clone(),
                &config.gateway.currency,
            ),
            cash: CashCollection::new(
                store.clone(),
                wallet.clone(),
                policy.clone(),
                notifier,
                &config.cash,
            ),
            settlement: SettlementEngine::new(store, policy),
            wallet,
        }
    }
}
