use sea_orm::DatabaseConnection;

use crate::config::PaymentSettings;
use crate::error::PaymentResult;
use crate::services::entitlement::{self, ActivePlanView, PlanSnapshot};
use crate::services::gateway::GatewayRegistry;

/// Entry point for the payment core.
///
/// Opening intents lives in `payment_intent`, applying gateway results in
/// `reconciliation`; both are `impl PaymentService` blocks over this state.
#[derive(Clone)]
pub struct PaymentService {
    pub(crate) db: DatabaseConnection,
    pub(crate) gateways: GatewayRegistry,
    pub(crate) settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(db: DatabaseConnection, gateways: GatewayRegistry, settings: PaymentSettings) -> Self {
        Self {
            db,
            gateways,
            settings,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn reconcile_user_plans(&self, account_id: i32) -> PaymentResult<PlanSnapshot> {
        entitlement::reconcile_user_plans(&self.db, account_id).await
    }

    pub async fn get_active_plan(&self, account_id: i32) -> PaymentResult<ActivePlanView> {
        entitlement::get_active_plan(&self.db, account_id).await
    }
}
