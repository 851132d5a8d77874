//! Payment provider notifications
//!
//! Only the outcome matters to the store: a succeeded payment completes the
//! assignment, anything else marks it failed.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, StoreError};

/// Result of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
}

/// M-Pesa STK push callback (`Body.stkCallback`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MpesaCallback {
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: Option<String>,
    pub result_code: i64,
    pub result_desc: Option<String>,
    pub amount: Option<f64>,
    pub receipt_number: Option<String>,
    pub transaction_date: Option<String>,
    pub phone_number: Option<String>,
}

impl MpesaCallback {
    /// Read the callback body Safaricom posts.
    pub fn parse(body: &Value) -> Result<Self> {
        let callback = body
            .get("Body")
            .and_then(|b| b.get("stkCallback"))
            .ok_or_else(|| StoreError::Validation("Invalid callback payload".to_string()))?;

        let result_code = callback
            .get("ResultCode")
            .and_then(|c| c.as_i64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| StoreError::Validation("callback has no ResultCode".to_string()))?;

        let mut parsed = MpesaCallback {
            merchant_request_id: text(callback.get("MerchantRequestID")),
            checkout_request_id: text(callback.get("CheckoutRequestID")),
            result_code,
            result_desc: text(callback.get("ResultDesc")),
            amount: None,
            receipt_number: None,
            transaction_date: None,
            phone_number: None,
        };

        let items = callback
            .get("CallbackMetadata")
            .and_then(|m| m.get("Item"))
            .and_then(Value::as_array);

        for item in items.into_iter().flatten() {
            let value = item.get("Value");
            match item.get("Name").and_then(Value::as_str) {
                Some("Amount") => parsed.amount = value.and_then(Value::as_f64),
                Some("MpesaReceiptNumber") => parsed.receipt_number = text(value),
                Some("TransactionDate") => parsed.transaction_date = text(value),
                Some("PhoneNumber") => parsed.phone_number = text(value),
                _ => {}
            }
        }

        Ok(parsed)
    }

    pub fn outcome(&self) -> PaymentOutcome {
        if self.result_code == 0 {
            PaymentOutcome::Succeeded
        } else {
            PaymentOutcome::Failed
        }
    }
}

/// Outcome of a Stripe payment intent status, if it is final.
pub fn stripe_outcome(status: &str) -> Option<PaymentOutcome> {
    match status {
        "succeeded" => Some(PaymentOutcome::Succeeded),
        "canceled" | "requires_payment_method" => Some(PaymentOutcome::Failed),
        _ => None,
    }
}

/// Strings and numbers both show up in callback metadata.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
