//! Pending Payment Sync Job
//!
//! Webhooks get lost. Payments whose debit leg is still PENDING after a
//! grace period are polled from their gateway and reconciled like a client
//! status check would.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, error, info, warn};

use crate::config::JobSettings;
use crate::entities::sea_orm_active_enums::PaymentStatus;
use crate::error::PaymentResult;
use crate::services::ledger::{pending_debit_legs, touch_pending_legs};
use crate::services::payments::PaymentService;

/// Payments polled per tick
const BATCH_SIZE: u64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub errors: usize,
}

/// Start the pending payment poller
///
/// # Arguments
///
/// * `payments` - Payment service used to reconcile each order
/// * `settings` - Poll interval and the age window of payments to poll
pub async fn start_pending_payment_job(payments: PaymentService, settings: JobSettings) {
    tokio::spawn(async move {
        info!(
            interval_secs = settings.pending_payment_interval_secs,
            min_age_secs = settings.pending_payment_min_age_secs,
            max_age_secs = settings.pending_payment_max_age_secs,
            "Pending payment job started"
        );

        let mut interval = interval(TokioDuration::from_secs(
            settings.pending_payment_interval_secs.max(1),
        ));

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping pending payment job");
                    break;
                }
                _ = interval.tick() => {
                    match poll_pending_payments(
                        &payments,
                        Utc::now(),
                        settings.pending_payment_min_age_secs,
                        settings.pending_payment_max_age_secs,
                    )
                    .await
                    {
                        Ok(summary) if summary.checked > 0 => {
                            info!(
                                checked = summary.checked,
                                completed = summary.completed,
                                failed = summary.failed,
                                still_pending = summary.still_pending,
                                errors = summary.errors,
                                "Pending payment poll completed"
                            );
                        }
                        Ok(_) => debug!("No pending payments to poll"),
                        Err(e) => error!(error = %e, "Pending payment poll failed"),
                    }
                }
            }
        }

        info!("Pending payment job stopped");
    });
}

/// Reconcile PENDING payments created between `max_age_secs` and
/// `min_age_secs` ago, least recently checked first. One failing order does
/// not stop the batch.
pub async fn poll_pending_payments(
    payments: &PaymentService,
    now: DateTime<Utc>,
    min_age_secs: i64,
    max_age_secs: i64,
) -> PaymentResult<PollSummary> {
    let newest = now - Duration::seconds(min_age_secs);
    let oldest = now - Duration::seconds(max_age_secs);

    let legs = pending_debit_legs(payments.db(), oldest, newest, BATCH_SIZE).await?;

    let mut summary = PollSummary::default();
    for leg in legs {
        summary.checked += 1;
        match payments.reconcile_payment(&leg.merchant_order_id).await {
            Ok(outcome) => match outcome.final_status {
                PaymentStatus::Completed => summary.completed += 1,
                PaymentStatus::Failed => summary.failed += 1,
                PaymentStatus::Pending => summary.still_pending += 1,
            },
            Err(e) => {
                summary.errors += 1;
                warn!(
                    merchant_order_id = %leg.merchant_order_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Failed to reconcile pending payment"
                );
                if let Err(e) =
                    touch_pending_legs(payments.db(), &leg.merchant_order_id, Utc::now()).await
                {
                    warn!(
                        merchant_order_id = %leg.merchant_order_id,
                        error = %e,
                        "Failed to reschedule pending payment"
                    );
                }
            }
        }
    }

    Ok(summary)
}
