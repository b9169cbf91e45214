//! Invoice-with-payment pipeline.
//!
//! 1. Create the invoice (`received`) under an existing contract.
//! 2. Record the payment transaction and move the invoice to the status
//!    the transaction outcome implies.
//! 3. Notify the event sink.
//!
//! A failure in step 1 writes nothing and is reported as is. A failure in
//! step 2 or 3 deletes the transaction, then the invoice, and sends a
//! cancellation to the sink if it had accepted the forward event.

use chrono::NaiveDate;
use records::{
    Invoice, InvoiceStatus, Money, NewInvoice, NewTransaction, PaymentTransaction, RecordId,
    RecordStore, RecordStoreExt, TransactionStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::log::{
    ROLLBACK_COMPLETE, ROLLBACK_START, ROLLBACK_STEP, SAGA_START, SAGA_SUCCESS, SagaLog,
    step_failed, step_start, step_success,
};
use super::{SINK_SYNCED, SagaReport};
use crate::error::StepError;
use crate::services::{EventKind, EventSink};

const SAGA_NAME: &str = "invoice_payment";

/// Prefix marking the confirmation code of a cancellation event.
pub const ROLLBACK_CODE_PREFIX: &str = "ROLLBACK-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePaymentRequest {
    pub contract_id: RecordId,
    pub amount: Money,
    pub received_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Must be unique across transactions; the store enforces it.
    pub confirmation_code: String,
    #[serde(default)]
    pub transaction_status: TransactionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePaymentReceipt {
    pub invoice_id: RecordId,
    pub transaction_id: RecordId,
    pub invoice_status: InvoiceStatus,
    pub sink_status: String,
}

/// What has been written so far, and so what rollback has to undo.
#[derive(Debug, Default)]
struct Progress {
    invoice: Option<Invoice>,
    transaction: Option<PaymentTransaction>,
    sink_notified: bool,
}

/// Creates an invoice and its payment transaction, then notifies the sink.
pub struct InvoicePaymentSaga<S, E> {
    store: S,
    sink: E,
}

impl<S, E> InvoicePaymentSaga<S, E>
where
    S: RecordStore,
    E: EventSink,
{
    pub fn new(store: S, sink: E) -> Self {
        Self { store, sink }
    }

    /// Runs the pipeline. Never returns `Err`: failures, including failed
    /// compensations, are reported in the returned log.
    #[tracing::instrument(
        skip(self, request),
        fields(saga = SAGA_NAME, contract_id = %request.contract_id)
    )]
    pub async fn create_invoice_with_payment(
        &self,
        request: InvoicePaymentRequest,
    ) -> SagaReport<InvoicePaymentReceipt> {
        metrics::counter!("pipeline_runs_total", "saga" => SAGA_NAME).increment(1);
        let started = std::time::Instant::now();
        let mut log = SagaLog::new();
        let mut progress = Progress::default();

        log.info(
            SAGA_START,
            format!(
                "Starting invoice payment saga for contract {} ({})",
                request.contract_id, request.confirmation_code
            ),
        );

        // Step 1: invoice. Nothing to undo if this fails.
        log.info(step_start(1), "Creating invoice");
        match self.create_invoice(&request).await {
            Ok(invoice) => {
                log.success(
                    step_success(1),
                    format!("Invoice {} created with status {}", invoice.id, invoice.status),
                );
                progress.invoice = Some(invoice);
            }
            Err(e) => {
                log.error(step_failed(1), e.to_string());
                metrics::counter!("pipeline_failures_total", "saga" => SAGA_NAME).increment(1);
                return SagaReport::failed("Invoice payment saga failed", e.to_string(), log);
            }
        }

        let result = self.remaining_steps(&request, &mut progress, &mut log).await;

        metrics::histogram!("pipeline_duration_seconds", "saga" => SAGA_NAME)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(receipt) => {
                log.success(
                    SAGA_SUCCESS,
                    format!(
                        "Invoice {} paid with transaction {}",
                        receipt.invoice_id, receipt.transaction_id
                    ),
                );
                SagaReport::succeeded("Invoice and transaction created and synced", receipt, log)
            }
            Err(e) => {
                metrics::counter!("pipeline_failures_total", "saga" => SAGA_NAME).increment(1);
                self.rollback(&request, &progress, &mut log).await;
                SagaReport::failed("Invoice payment saga failed, changes rolled back", e.to_string(), log)
            }
        }
    }

    async fn remaining_steps(
        &self,
        request: &InvoicePaymentRequest,
        progress: &mut Progress,
        log: &mut SagaLog,
    ) -> Result<InvoicePaymentReceipt, StepError> {
        let invoice_id = progress
            .invoice
            .as_ref()
            .map(|i| i.id)
            .ok_or_else(|| StepError::MissingContext {
                step_id: step_success(1),
                field: "invoice_id".to_string(),
            })?;

        // Step 2: transaction, then the invoice status it implies.
        log.info(step_start(2), "Recording payment transaction");
        let transaction = match self.store.insert_transaction(NewTransaction {
            invoice_id,
            amount: request.amount,
            confirmation_code: request.confirmation_code.clone(),
            status: request.transaction_status.clone(),
        })
        .await
        {
            Ok(transaction) => transaction,
            Err(e) => {
                log.error(step_failed(2), e.to_string());
                return Err(e.into());
            }
        };
        let transaction_id = transaction.id;
        progress.transaction = Some(transaction);

        let invoice_status = request.transaction_status.invoice_status();
        if let Err(e) = self
            .store
            .update_invoice_status(invoice_id, invoice_status)
            .await
        {
            log.error(step_failed(2), e.to_string());
            return Err(e.into());
        }
        log.success(
            step_success(2),
            format!("Transaction {transaction_id} recorded, invoice {invoice_id} is {invoice_status}"),
        );

        // Step 3: sink.
        log.info(step_start(3), "Notifying event sink");
        let payload = transaction_payload(
            request,
            invoice_id,
            &request.confirmation_code,
            request.transaction_status.as_str(),
        );
        if let Err(e) = self.sink.publish(EventKind::Transaction, &payload).await {
            log.error(step_failed(3), e.to_string());
            return Err(e.into());
        }
        progress.sink_notified = true;
        log.success(step_success(3), "Transaction event accepted by sink");

        Ok(InvoicePaymentReceipt {
            invoice_id,
            transaction_id,
            invoice_status,
            sink_status: SINK_SYNCED.to_string(),
        })
    }

    async fn create_invoice(&self, request: &InvoicePaymentRequest) -> Result<Invoice, StepError> {
        if !request.amount.is_positive() {
            return Err(StepError::Validation(format!(
                "Amount must be positive, got {}",
                request.amount
            )));
        }
        if !self.store.contract_exists(request.contract_id).await? {
            return Err(StepError::Validation(format!(
                "Contract {} does not exist",
                request.contract_id
            )));
        }

        let invoice = self
            .store
            .insert_invoice(NewInvoice {
                contract_id: request.contract_id,
                amount: request.amount,
                received_date: request.received_date,
                due_date: request.due_date,
                status: InvoiceStatus::Received,
            })
            .await?;
        Ok(invoice)
    }

    /// Undoes whatever `progress` records. Every compensation runs even if
    /// an earlier one failed.
    async fn rollback(&self, request: &InvoicePaymentRequest, progress: &Progress, log: &mut SagaLog) {
        metrics::counter!("pipeline_rollbacks_total", "saga" => SAGA_NAME).increment(1);
        log.info(ROLLBACK_START, "Rolling back invoice payment saga");

        if let Some(transaction) = &progress.transaction {
            match self.store.delete_transaction(transaction.id).await {
                Ok(()) => log.success(
                    ROLLBACK_STEP,
                    format!("Transaction {} deleted", transaction.id),
                ),
                Err(e) => log.error(
                    ROLLBACK_STEP,
                    format!("Failed to delete transaction {}: {e}", transaction.id),
                ),
            }
        }

        if let Some(invoice) = &progress.invoice {
            match self.store.delete_invoice(invoice.id).await {
                Ok(()) => log.success(ROLLBACK_STEP, format!("Invoice {} deleted", invoice.id)),
                Err(e) => log.error(
                    ROLLBACK_STEP,
                    format!("Failed to delete invoice {}: {e}", invoice.id),
                ),
            }
        }

        if let (true, Some(invoice)) = (progress.sink_notified, &progress.invoice) {
            let code = format!("{ROLLBACK_CODE_PREFIX}{}", request.confirmation_code);
            let payload = transaction_payload(request, invoice.id, &code, "cancelled");
            match self
                .sink
                .publish_cancellation(EventKind::Transaction, &payload)
                .await
            {
                Ok(()) => log.success(ROLLBACK_STEP, "Cancellation event accepted by sink"),
                Err(e) => log.error(
                    ROLLBACK_STEP,
                    format!("Failed to send cancellation event: {e}"),
                ),
            }
        }

        log.info(ROLLBACK_COMPLETE, "Rollback finished");
    }
}

fn transaction_payload(
    request: &InvoicePaymentRequest,
    invoice_id: RecordId,
    confirmation_code: &str,
    status: &str,
) -> Value {
    json!({
        "invoice_id": invoice_id.as_i64(),
        "amount": request.amount.as_f64(),
        "status": status,
        "confirmation_code": confirmation_code,
        "description": format!(
            "Payment for invoice {invoice_id} under contract {}",
            request.contract_id
        ),
    })
}
