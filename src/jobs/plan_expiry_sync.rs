//! Plan Expiry Sync Job
//!
//! Expires lapsed subscriptions and promotes queued ones for accounts whose
//! cached plan snapshot has run out, so entitlements move on even when the
//! account is never read.

use chrono::Utc;
use sea_orm::DatabaseConnection;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{error, info};

use crate::services::entitlement::expire_due_plans;

/// Default sweep interval in seconds (1 hour)
pub const DEFAULT_PLAN_EXPIRY_INTERVAL_SECS: u64 = 3600;

/// Start the plan expiry sweep
///
/// # Arguments
///
/// * `db` - Database connection
/// * `interval_secs` - Seconds between sweeps (`PLAN_EXPIRY_INTERVAL_SECS`)
pub async fn start_plan_expiry_job(db: DatabaseConnection, interval_secs: u64) {
    tokio::spawn(async move {
        let interval_secs = if interval_secs == 0 {
            DEFAULT_PLAN_EXPIRY_INTERVAL_SECS
        } else {
            interval_secs
        };
        info!(interval_secs, "Plan expiry job started");

        let mut interval = interval(TokioDuration::from_secs(interval_secs));

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping plan expiry job");
                    break;
                }
                _ = interval.tick() => {
                    match expire_due_plans(&db, Utc::now()).await {
                        Ok(refreshed) => info!(refreshed, "Plan expiry sweep completed"),
                        // Next tick retries
                        Err(e) => error!(error = %e, "Plan expiry sweep failed"),
                    }
                }
            }
        }

        info!("Plan expiry job stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_interval() {
        assert_eq!(DEFAULT_PLAN_EXPIRY_INTERVAL_SECS, 3600);
    }
}
