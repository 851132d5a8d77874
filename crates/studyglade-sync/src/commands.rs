//! Dashboard actions
//!
//! Student, tutor, messaging and library actions expressed against a
//! [`SyncedCollectionStore`]. Status changes made here are checked with
//! [`RecordStatus::can_transition_to`]; the store itself accepts any status.

use serde_json::json;
use tracing::info;

use crate::error::{Result, StoreError};
use crate::payment::PaymentOutcome;
use crate::record::{FileUpload, Record, RecordFilter, RecordPatch, RecordStatus};
use crate::store::SyncedCollectionStore;
use crate::views::format_file_size;

/// Minimum price per page of work.
pub const MIN_AMOUNT_PER_PAGE: f64 = 3.0;

/// A question as typed into the student form.
#[derive(Debug, Clone, Default)]
pub struct NewQuestion {
    pub title: String,
    pub description: String,
    pub subject: String,
    pub topic: String,
    pub deadline: Option<String>,
    /// The student's offer
    pub amount: f64,
}

/// A library upload.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub category: Option<String>,
    pub subject: Option<String>,
    pub file: FileUpload,
}

/// A message typed into an assignment thread.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub assignment_id: String,
    pub text: String,
    pub file: Option<FileUpload>,
}

fn acting_owner(store: &SyncedCollectionStore) -> Result<String> {
    store
        .owner()
        .map(str::to_string)
        .ok_or_else(|| StoreError::Validation("no signed-in owner".to_string()))
}

/// Current copy of `id`, if it may move to `next`.
fn transition(store: &SyncedCollectionStore, id: &str, next: RecordStatus) -> Result<Record> {
    let record = store
        .get(id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    if !record.status().can_transition_to(next) {
        return Err(StoreError::InvalidTransition {
            from: record.status(),
            to: next,
        });
    }
    Ok(record)
}

/// Post a new question for the store's owner.
pub async fn post_question(store: &mut SyncedCollectionStore, question: NewQuestion) -> Result<Record> {
    let owner = acting_owner(store)?;
    if !question.amount.is_finite() || question.amount < 0.0 {
        return Err(StoreError::Validation("amount must be a non-negative number".to_string()));
    }

    let mut record = Record::new(owner)
        .with_status(RecordStatus::Pending)
        .with_field("title", question.title.trim())
        .with_field("description", question.description)
        .with_field("subject", question.subject)
        .with_field("topic", question.topic)
        .with_field("amount", question.amount)
        .with_field("views", 0);
    if let Some(deadline) = question.deadline {
        record.set("deadline", deadline);
    }

    let saved = store.save(record).await?;
    info!(record_id = ?saved.id(), owner = %saved.owner_key, "Question posted");
    Ok(saved)
}

/// Price to charge: the offer, or the per-page minimum when that is higher.
pub fn quote_total(offer: f64, pages: u32) -> Result<f64> {
    if pages < 1 {
        return Err(StoreError::Validation("at least one page is required".to_string()));
    }
    if !offer.is_finite() || offer < 0.0 {
        return Err(StoreError::Validation("offer must be a non-negative number".to_string()));
    }
    Ok(offer.max(f64::from(pages) * MIN_AMOUNT_PER_PAGE))
}

/// Fix the price for `pages` of work and wait for payment.
pub async fn submit_payment(store: &mut SyncedCollectionStore, id: &str, pages: u32) -> Result<Record> {
    let record = transition(store, id, RecordStatus::PendingPayment)?;
    let total = quote_total(record.amount(), pages)?;

    let patch = RecordPatch::status(RecordStatus::PendingPayment)
        .set("amount", total)
        .set("pages", pages);
    store.update(id, patch).await
}

/// Apply the provider's verdict to an assignment awaiting payment.
pub async fn record_payment(
    store: &mut SyncedCollectionStore,
    id: &str,
    outcome: PaymentOutcome,
) -> Result<Record> {
    let next = match outcome {
        PaymentOutcome::Succeeded => RecordStatus::Completed,
        PaymentOutcome::Failed => RecordStatus::Failed,
    };

    let record = store
        .get(id)
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    if record.status() != RecordStatus::PendingPayment {
        return Err(StoreError::InvalidTransition {
            from: record.status(),
            to: next,
        });
    }

    info!(record_id = %id, outcome = ?outcome, "Payment recorded");
    store
        .update(id, RecordPatch::status(next).set("paymentOutcome", json!(outcome)))
        .await
}

/// Tutor delivers the answer file; the assignment is then complete.
pub async fn upload_answer(
    store: &mut SyncedCollectionStore,
    id: &str,
    file: &FileUpload,
) -> Result<Record> {
    transition(store, id, RecordStatus::Completed)?;
    let answer = store.upload_attachment(id, file).await?;

    let patch = RecordPatch::status(RecordStatus::Completed).set("answer", json!(answer));
    store.update(id, patch).await
}

/// Flag an assignment as disputed.
pub async fn report_dispute(
    store: &mut SyncedCollectionStore,
    id: &str,
    reason: &str,
) -> Result<Record> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(StoreError::Validation("a dispute needs a reason".to_string()));
    }
    transition(store, id, RecordStatus::Dispute)?;

    let patch = RecordPatch::status(RecordStatus::Dispute).set("dispute_reason", reason);
    store.update(id, patch).await
}

/// Add a document to the library and attach its file.
pub async fn upload_document(store: &mut SyncedCollectionStore, document: NewDocument) -> Result<Record> {
    store.spec().file_rules.check(&document.file)?;
    let owner = acting_owner(store)?;

    let category = document
        .category
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| "other".to_string());
    let subject = document
        .subject
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "general".to_string());

    let record = Record::new(owner)
        .with_status(RecordStatus::Completed)
        .with_field("title", document.title.trim())
        .with_field("category", category)
        .with_field("subject", subject)
        .with_field("downloads", 0)
        .with_field("fileName", document.file.name.clone())
        .with_field("fileType", document.file.mime_type.clone())
        .with_field("fileSize", format_file_size(document.file.size() as u64));

    let saved = store.save(record).await?;
    let id = saved
        .id()
        .map(str::to_string)
        .ok_or_else(|| StoreError::Normalization("saved document has no id".to_string()))?;

    let attachment = store.upload_attachment(&id, &document.file).await?;
    let patch = RecordPatch::new()
        .set("fileUrl", attachment.url.clone())
        .append_attachment(attachment);
    let stored = store.update(&id, patch).await?;

    info!(record_id = %id, "Document uploaded");
    Ok(stored)
}

/// Count a download.
pub async fn download_document(store: &mut SyncedCollectionStore, id: &str) -> Result<Record> {
    store.increment_counter(id, "downloads").await
}

fn thread_filter(assignment_id: &str) -> RecordFilter {
    RecordFilter::new().with_field("assignmentId", assignment_id)
}

/// Post to an assignment thread as the store's owner.
///
/// Leaves the store showing that thread.
pub async fn send_message(store: &mut SyncedCollectionStore, message: NewMessage) -> Result<Record> {
    if let Some(file) = &message.file {
        store.spec().file_rules.check(file)?;
    }
    let owner = acting_owner(store)?;
    let assignment_id = message.assignment_id.trim().to_string();

    let mut record = Record::new(owner)
        .with_field("assignmentId", assignment_id.as_str())
        .with_field("text", message.text.trim());
    if let Some(file) = &message.file {
        record.set("fileName", file.name.clone());
    }
    store.spec().validate(&record)?;

    store.load(thread_filter(&assignment_id)).await?;
    let saved = store.save(record).await?;
    let id = saved
        .id()
        .map(str::to_string)
        .ok_or_else(|| StoreError::Normalization("saved message has no id".to_string()))?;

    let sent = match &message.file {
        Some(file) => store.attach_file(&id, file).await?,
        None => saved,
    };
    info!(record_id = %id, assignment_id = %assignment_id, "Message sent");
    Ok(sent)
}

/// Messages of one assignment, oldest first.
pub async fn list_messages(store: &mut SyncedCollectionStore, assignment_id: &str) -> Result<Vec<Record>> {
    let assignment_id = assignment_id.trim();
    if assignment_id.is_empty() {
        return Err(StoreError::Validation("Assignment ID is required".to_string()));
    }

    let mut messages = store.load(thread_filter(assignment_id)).await?.to_vec();
    messages.sort_by_key(|m| m.created_at);
    Ok(messages)
}
