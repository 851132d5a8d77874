//! Dashboard command integration tests
//!
//! Walks assignments through the student and tutor flows and exercises the
//! document library, all in local mode on a shared adapter.

use std::sync::Arc;
use studyglade_sync::commands::{
    download_document, list_messages, post_question, quote_total, record_payment, report_dispute,
    send_message, submit_payment, upload_answer, upload_document,
};
use studyglade_sync::remote::mock::MockRemote;
use studyglade_sync::{
    CollectionSpec, DashboardStats, FileUpload, LocalAdapter, MemoryAdapter, MpesaCallback,
    NewDocument, NewMessage, NewQuestion, PaymentOutcome, RecordStatus, ReportSnapshot, StoreError,
    StoreMode, SyncedCollectionStore, LOCAL_BLOB_SCHEME,
};

async fn student(adapter: Arc<dyn LocalAdapter>, owner: &str) -> SyncedCollectionStore {
    let mut store = SyncedCollectionStore::new(CollectionSpec::questions(), adapter);
    store.initialize(Some(owner)).await.unwrap();
    store
}

fn question(title: &str, amount: f64) -> NewQuestion {
    NewQuestion {
        title: title.to_string(),
        description: "500 words".to_string(),
        subject: "English".to_string(),
        topic: "Poetry".to_string(),
        deadline: Some("2025-11-01T12:00".to_string()),
        amount,
    }
}

fn answer_file() -> FileUpload {
    FileUpload::new("answer.pdf", "application/pdf", b"%PDF-1.7 answer".to_vec())
}

// =============================================================================
// Student flow
// =============================================================================

#[tokio::test]
async fn test_post_and_pay() {
    let adapter: Arc<dyn LocalAdapter> = Arc::new(MemoryAdapter::new());
    let mut store = student(adapter, "alice").await;

    let posted = post_question(&mut store, question("Essay", 5.0)).await.unwrap();
    assert_eq!(posted.status(), RecordStatus::Pending);
    assert_eq!(posted.owner_key, "alice");
    assert_eq!(posted.get_u64("views"), Some(0));
    let id = posted.id().unwrap().to_string();

    let quoted = submit_payment(&mut store, &id, 4).await.unwrap();
    assert_eq!(quoted.status(), RecordStatus::PendingPayment);
    assert_eq!(quoted.amount(), 12.0);
    assert_eq!(quoted.get_u64("pages"), Some(4));

    let failed = record_payment(&mut store, &id, PaymentOutcome::Failed).await.unwrap();
    assert_eq!(failed.status(), RecordStatus::Failed);

    // Retry after a declined payment
    submit_payment(&mut store, &id, 4).await.unwrap();
    let paid = record_payment(&mut store, &id, PaymentOutcome::Succeeded).await.unwrap();
    assert_eq!(paid.status(), RecordStatus::Completed);

    let stats = DashboardStats::from_records(store.records());
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.earnings, 12.0);
}

#[tokio::test]
async fn test_payment_requires_submission() {
    let mut store = student(Arc::new(MemoryAdapter::new()), "alice").await;
    let id = post_question(&mut store, question("Essay", 5.0))
        .await
        .unwrap()
        .id
        .unwrap();

    let err = record_payment(&mut store, &id, PaymentOutcome::Succeeded)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidTransition {
            from: RecordStatus::Pending,
            to: RecordStatus::Completed
        }
    ));
}

#[tokio::test]
async fn test_mpesa_callback_completes_assignment() {
    let mut store = student(Arc::new(MemoryAdapter::new()), "alice").await;
    let id = post_question(&mut store, question("Essay", 5.0))
        .await
        .unwrap()
        .id
        .unwrap();
    submit_payment(&mut store, &id, 1).await.unwrap();

    let callback = MpesaCallback::parse(&serde_json::json!({
        "Body": {"stkCallback": {"ResultCode": 0, "ResultDesc": "ok"}}
    }))
    .unwrap();
    let paid = record_payment(&mut store, &id, callback.outcome()).await.unwrap();
    assert_eq!(paid.status(), RecordStatus::Completed);
}

#[tokio::test]
async fn test_post_question_validation() {
    let mut store = student(Arc::new(MemoryAdapter::new()), "alice").await;

    assert!(matches!(
        post_question(&mut store, question("  ", 5.0)).await,
        Err(StoreError::Validation(_))
    ));
    assert!(matches!(
        post_question(&mut store, question("Essay", -2.0)).await,
        Err(StoreError::Validation(_))
    ));
    assert!(store.records().is_empty());

    let mut anonymous =
        SyncedCollectionStore::new(CollectionSpec::questions(), Arc::new(MemoryAdapter::new()));
    assert!(post_question(&mut anonymous, question("Essay", 5.0)).await.is_err());
}

#[test]
fn test_quote_uses_per_page_minimum() {
    assert_eq!(quote_total(20.0, 3).unwrap(), 20.0);
    assert_eq!(quote_total(5.0, 3).unwrap(), 9.0);
}

// =============================================================================
// Tutor flow
// =============================================================================

#[tokio::test]
async fn test_tutor_answers_student_question() {
    let adapter: Arc<dyn LocalAdapter> = Arc::new(MemoryAdapter::new());
    let mut alice = student(adapter.clone(), "alice").await;
    let id = post_question(&mut alice, question("Essay", 5.0))
        .await
        .unwrap()
        .id
        .unwrap();

    let mut tutor = SyncedCollectionStore::new(CollectionSpec::tutor_queue(), adapter.clone());
    tutor.initialize(Some("tutor")).await.unwrap();
    assert_eq!(tutor.records().len(), 1);

    let answered = upload_answer(&mut tutor, &id, &answer_file()).await.unwrap();
    assert_eq!(answered.status(), RecordStatus::Completed);
    assert_eq!(answered.owner_key, "alice");
    let url = answered.get("answer").and_then(|a| a["url"].as_str()).unwrap();
    assert!(url.starts_with(LOCAL_BLOB_SCHEME));
    assert!(tutor.resolve_local_blob(url).is_some());

    alice.refresh().await.unwrap();
    let seen = alice.get(&id).unwrap();
    assert_eq!(seen.status(), RecordStatus::Completed);
    assert_eq!(seen.get("answer"), answered.get("answer"));
}

#[tokio::test]
async fn test_disputes() {
    let adapter: Arc<dyn LocalAdapter> = Arc::new(MemoryAdapter::new());
    let mut store = student(adapter, "alice").await;
    let open = post_question(&mut store, question("Essay", 5.0))
        .await
        .unwrap()
        .id
        .unwrap();
    let done = post_question(&mut store, question("Lab report", 9.0))
        .await
        .unwrap()
        .id
        .unwrap();

    assert!(matches!(
        report_dispute(&mut store, &open, "   ").await,
        Err(StoreError::Validation(_))
    ));

    let disputed = report_dispute(&mut store, &open, " Late delivery ").await.unwrap();
    assert_eq!(disputed.status(), RecordStatus::Dispute);
    assert_eq!(disputed.get_str("dispute_reason"), Some("Late delivery"));

    submit_payment(&mut store, &done, 1).await.unwrap();
    record_payment(&mut store, &done, PaymentOutcome::Succeeded).await.unwrap();
    assert!(matches!(
        report_dispute(&mut store, &done, "Wrong answer").await,
        Err(StoreError::InvalidTransition {
            from: RecordStatus::Completed,
            to: RecordStatus::Dispute
        })
    ));
}

#[tokio::test]
async fn test_unknown_assignment() {
    let mut store = student(Arc::new(MemoryAdapter::new()), "alice").await;
    assert!(matches!(
        submit_payment(&mut store, "nope", 1).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        upload_answer(&mut store, "nope", &answer_file()).await,
        Err(StoreError::NotFound(_))
    ));
}

// =============================================================================
// Document library
// =============================================================================

#[tokio::test]
async fn test_upload_and_download_document() {
    let adapter: Arc<dyn LocalAdapter> = Arc::new(MemoryAdapter::new());
    let mut library = SyncedCollectionStore::new(CollectionSpec::documents(), adapter);
    library.initialize(Some("alice")).await.unwrap();
    assert_eq!(library.records().len(), 3);

    let uploaded = upload_document(
        &mut library,
        NewDocument {
            title: "Chemistry Summary".to_string(),
            category: None,
            subject: Some(String::new()),
            file: FileUpload::new("chem.txt", "text/plain", b"H2O".to_vec()),
        },
    )
    .await
    .unwrap();

    assert_eq!(uploaded.get_str("category"), Some("other"));
    assert_eq!(uploaded.get_str("subject"), Some("general"));
    assert_eq!(uploaded.get_u64("downloads"), Some(0));
    assert_eq!(uploaded.get_str("fileSize"), Some("3 Bytes"));
    assert_eq!(uploaded.attachments.len(), 1);
    assert_eq!(uploaded.get_str("fileUrl"), Some(uploaded.attachments[0].url.as_str()));
    assert_eq!(library.records().len(), 4);

    let id = uploaded.id().unwrap().to_string();
    download_document(&mut library, &id).await.unwrap();
    let counted = download_document(&mut library, &id).await.unwrap();
    assert_eq!(counted.get_u64("downloads"), Some(2));
    assert_eq!(library.get(&id).and_then(|r| r.get_u64("downloads")), Some(2));
}

#[tokio::test]
async fn test_rejected_document_is_not_created() {
    let mut library =
        SyncedCollectionStore::new(CollectionSpec::documents(), Arc::new(MemoryAdapter::new()));
    library.initialize(Some("alice")).await.unwrap();

    let err = upload_document(
        &mut library,
        NewDocument {
            title: "Installer".to_string(),
            category: Some("notes".to_string()),
            subject: None,
            file: FileUpload::new("setup.exe", "application/x-msdownload", vec![0x4d, 0x5a]),
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(library.records().len(), 3);
}

#[tokio::test]
async fn test_download_falls_back_when_remote_fails() {
    let remote = Arc::new(MockRemote::new());
    remote
        .seed(
            "documents",
            vec![serde_json::json!({"id": "1", "title": "Calculus Notes", "uploadedBy": "Admin", "downloads": 7})],
        )
        .await;

    let adapter: Arc<dyn LocalAdapter> = Arc::new(MemoryAdapter::new());
    let mut library =
        SyncedCollectionStore::new(CollectionSpec::documents(), adapter).with_remote(remote.clone());
    library.initialize(Some("alice")).await.unwrap();
    assert_eq!(library.get("1").and_then(|r| r.get_u64("downloads")), Some(7));

    remote.set_available(false);
    let counted = download_document(&mut library, "1").await.unwrap();

    // Local copy starts from the seed library, not the server's count
    assert_eq!(library.mode(), StoreMode::Local);
    assert_eq!(counted.get_u64("downloads"), Some(121));
}

// =============================================================================
// Messaging
// =============================================================================

async fn thread(adapter: Arc<dyn LocalAdapter>, owner: &str) -> SyncedCollectionStore {
    let mut store = SyncedCollectionStore::new(CollectionSpec::messages(), adapter);
    store.initialize(Some(owner)).await.unwrap();
    store
}

fn text(assignment_id: &str, body: &str) -> NewMessage {
    NewMessage {
        assignment_id: assignment_id.to_string(),
        text: body.to_string(),
        file: None,
    }
}

#[tokio::test]
async fn test_student_and_tutor_share_a_thread() {
    let adapter: Arc<dyn LocalAdapter> = Arc::new(MemoryAdapter::new());
    let mut alice = thread(adapter.clone(), "alice").await;
    let mut tutor = thread(adapter.clone(), "tutor").await;

    let first = send_message(&mut alice, text("a1", " Is the deadline firm? ")).await.unwrap();
    assert_eq!(first.owner_key, "alice");
    assert_eq!(first.get_str("text"), Some("Is the deadline firm?"));

    send_message(&mut tutor, text("a1", "Yes, Friday noon")).await.unwrap();
    send_message(&mut tutor, text("a2", "Other thread")).await.unwrap();

    let messages = list_messages(&mut alice, "a1").await.unwrap();
    let senders: Vec<_> = messages.iter().map(|m| m.owner_key.as_str()).collect();
    assert_eq!(senders, ["alice", "tutor"]);
    assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));

    assert_eq!(list_messages(&mut tutor, "a2").await.unwrap().len(), 1);
    assert!(list_messages(&mut tutor, "a3").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_message_with_attachment_only() {
    let adapter: Arc<dyn LocalAdapter> = Arc::new(MemoryAdapter::new());
    let mut tutor = thread(adapter, "tutor").await;

    let sent = send_message(
        &mut tutor,
        NewMessage {
            assignment_id: "a1".to_string(),
            text: String::new(),
            file: Some(answer_file()),
        },
    )
    .await
    .unwrap();

    assert_eq!(sent.attachments.len(), 1);
    assert!(sent.attachments[0].url.starts_with(LOCAL_BLOB_SCHEME));
    assert_eq!(sent.get_str("fileName"), Some("answer.pdf"));
    assert_eq!(list_messages(&mut tutor, "a1").await.unwrap()[0].attachments.len(), 1);
}

#[tokio::test]
async fn test_invalid_messages_are_not_stored() {
    let adapter: Arc<dyn LocalAdapter> = Arc::new(MemoryAdapter::new());
    let mut alice = thread(adapter.clone(), "alice").await;

    assert!(matches!(
        send_message(&mut alice, text("a1", "   ")).await,
        Err(StoreError::Validation(_))
    ));
    assert!(matches!(
        send_message(&mut alice, text(" ", "Hello")).await,
        Err(StoreError::Validation(_))
    ));
    let exe = NewMessage {
        file: Some(FileUpload::new("run.exe", "application/x-msdownload", vec![1])),
        ..text("a1", "see attached")
    };
    assert!(matches!(send_message(&mut alice, exe).await, Err(StoreError::Validation(_))));
    assert!(matches!(
        list_messages(&mut alice, "").await,
        Err(StoreError::Validation(_))
    ));

    assert_eq!(adapter.get("messages").await.unwrap(), None);
}

#[tokio::test]
async fn test_remote_thread_is_filtered_by_assignment() {
    let remote = Arc::new(MockRemote::new());
    let adapter: Arc<dyn LocalAdapter> = Arc::new(MemoryAdapter::new());
    let mut alice = SyncedCollectionStore::new(CollectionSpec::messages(), adapter).with_remote(remote.clone());
    alice.initialize(Some("alice")).await.unwrap();

    send_message(&mut alice, text("a1", "Hi")).await.unwrap();
    send_message(&mut alice, text("a2", "Other")).await.unwrap();

    let messages = list_messages(&mut alice, "a1").await.unwrap();
    assert_eq!(alice.mode(), StoreMode::Remote);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].get_str("text"), Some("Hi"));
    assert_eq!(remote.records("messages").await.len(), 2);
}

// =============================================================================
// Reports
// =============================================================================

#[tokio::test]
async fn test_report_over_paid_assignments() {
    let adapter: Arc<dyn LocalAdapter> = Arc::new(MemoryAdapter::new());

    for (owner, outcome) in [("alice", PaymentOutcome::Succeeded), ("bob", PaymentOutcome::Failed)] {
        let mut store = student(adapter.clone(), owner).await;
        let id = post_question(&mut store, question("Essay", 5.0))
            .await
            .unwrap()
            .id()
            .unwrap()
            .to_string();
        submit_payment(&mut store, &id, 3).await.unwrap();
        record_payment(&mut store, &id, outcome).await.unwrap();
    }
    let mut carol = student(adapter.clone(), "carol").await;
    post_question(&mut carol, question("Lab", 0.0)).await.unwrap();

    let mut admin = SyncedCollectionStore::new(CollectionSpec::tutor_queue(), adapter);
    admin.initialize(Some("admin")).await.unwrap();
    let report = ReportSnapshot::from_records(admin.records(), chrono::Utc::now());

    assert_eq!(report.total_assignments, 3);
    assert_eq!(report.total_owners, 3);
    assert_eq!(report.total_payments, 1);
    assert_eq!(report.latest_payments[0].owner_key, "alice");
    assert_eq!(report.latest_payments[0].amount, 9.0);
}
