use serde::Serialize;

use crate::entities::{subscription_plans, user_subscriptions};
use crate::services::entitlement::{ActivePlanView, PlanEntry};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntryResponse {
    pub subscription: user_subscriptions::Model,
    pub plan: Option<subscription_plans::Model>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePlanResponse {
    pub active_plan: Option<PlanEntryResponse>,
    pub upcoming_plans: Vec<PlanEntryResponse>,
    pub subscription_status: bool,
}

impl From<PlanEntry> for PlanEntryResponse {
    fn from(entry: PlanEntry) -> Self {
        Self {
            subscription: entry.subscription,
            plan: entry.plan,
        }
    }
}

impl From<ActivePlanView> for ActivePlanResponse {
    fn from(view: ActivePlanView) -> Self {
        Self {
            active_plan: view.active_plan.map(Into::into),
            upcoming_plans: view.upcoming_plans.into_iter().map(Into::into).collect(),
            subscription_status: view.subscription_status,
        }
    }
}
