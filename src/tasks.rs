use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::handlers::PendingPayments;
use crate::store::SyncStore;
use crate::xero::LedgerApi;

/// Periodically drop expired dedup entries and expectations so passive
/// TTL enforcement stays bounded.
pub fn spawn_compaction(store: Arc<dyn SyncStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            store.compact().await;
        }
    })
}

/// Retry payments that failed to record after their invoice was
/// created, until they succeed or hit the attempt cap.
pub fn spawn_payment_sweep(
    queue: PendingPayments,
    ledger: Arc<dyn LedgerApi>,
    interval: Duration,
    max_attempts: u32,
    jitter_ms: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_pending_payments(&queue, ledger.as_ref(), max_attempts, jitter_ms).await;
        }
    })
}

/// One sweep pass over the pending-payment queue.
pub async fn sweep_pending_payments(
    queue: &PendingPayments,
    ledger: &dyn LedgerApi,
    max_attempts: u32,
    jitter_ms: u64,
) {
    for mut payment in queue.take_all().await {
        if jitter_ms > 0 {
            sleep(Duration::from_millis(fastrand::u64(0..=jitter_ms))).await;
        }

        match ledger
            .create_payment(&payment.invoice_id, payment.amount)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    invoice_id = %payment.invoice_id,
                    amount = payment.amount,
                    "recorded payment on sweep"
                );
            }
            Err(err) => {
                payment.attempts += 1;
                if payment.attempts >= max_attempts {
                    tracing::error!(
                        invoice_id = %payment.invoice_id,
                        attempts = payment.attempts,
                        %err,
                        "giving up on payment; invoice stays authorised"
                    );
                } else {
                    tracing::warn!(
                        invoice_id = %payment.invoice_id,
                        attempts = payment.attempts,
                        %err,
                        "payment retry failed, requeueing"
                    );
                    queue.requeue(payment).await;
                }
            }
        }
    }
}
