pub mod checkout;
pub mod health;
pub mod orders;
pub mod payment_return;
pub mod payment_webhooks;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::services::orders::OrderService;
use crate::services::pricing::PriceTable;
use crate::services::reconciliation::PaymentReconciler;
use crate::store::OrderStore;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub reconciler: Arc<PaymentReconciler>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppServices {
    /// Wires the service graph over a store and gateway implementation.
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
        config: &AppConfig,
    ) -> Self {
        let orders = Arc::new(OrderService::new(
            store,
            event_sender,
            PriceTable::from_config(&config.pricing),
        ));
        let reconciler = Arc::new(PaymentReconciler::new(
            orders.clone(),
            gateway.clone(),
            config.currency.clone(),
            Duration::from_secs(config.reconcile_grace_secs),
        ));
        Self {
            orders,
            reconciler,
            gateway,
        }
    }
}
