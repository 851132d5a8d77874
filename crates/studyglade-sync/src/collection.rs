//! Per-collection settings: endpoint, storage key, scoping, validation,
//! file rules and seed data.

use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::record::{FileUpload, Record, RecordStatus};

/// MIME types accepted for uploads.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/plain",
    "image/jpeg",
    "image/png",
];

const MB: usize = 1024 * 1024;

/// What a collection holds; selects the validation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// Student questions / tutor assignments
    Assignments,
    /// Shared document library
    Documents,
    /// Per-assignment conversation between student and tutor
    Messages,
}

/// Limits applied to uploaded files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRules {
    pub max_bytes: usize,
    pub allowed_mime_types: Vec<String>,
}

impl FileRules {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            allowed_mime_types: ALLOWED_MIME_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn check(&self, file: &FileUpload) -> Result<()> {
        if file.bytes.is_empty() {
            return Err(StoreError::Validation("Please select a file".to_string()));
        }
        if file.size() > self.max_bytes {
            return Err(StoreError::Validation(format!(
                "File must be smaller than {}MB",
                self.max_bytes / MB
            )));
        }
        if !self.allowed_mime_types.iter().any(|m| m == &file.mime_type) {
            return Err(StoreError::Validation(format!(
                "File type '{}' not allowed. Allowed: PDF, Word, PowerPoint, Text, Images",
                file.mime_type
            )));
        }
        Ok(())
    }
}

/// Static description of one synchronized collection.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    /// Path segment on the API (`/{name}`)
    pub name: String,
    /// Key under which the local adapter keeps the collection
    pub storage_key: String,
    pub kind: CollectionKind,
    /// Restrict reads to the acting owner
    pub owner_scoped: bool,
    /// Written to local storage the first time the collection is empty
    pub seeds: Vec<Record>,
    pub file_rules: FileRules,
}

impl CollectionSpec {
    /// The student's own questions.
    pub fn questions() -> Self {
        Self {
            name: "assignments".to_string(),
            storage_key: "questions".to_string(),
            kind: CollectionKind::Assignments,
            owner_scoped: true,
            seeds: Vec::new(),
            file_rules: FileRules::new(5 * MB),
        }
    }

    /// Every student's assignments, as the tutor dashboard sees them.
    ///
    /// Shares its storage key with [`CollectionSpec::questions`].
    pub fn tutor_queue() -> Self {
        Self {
            owner_scoped: false,
            file_rules: FileRules::new(10 * MB),
            ..Self::questions()
        }
    }

    /// The shared document library.
    pub fn documents() -> Self {
        Self {
            name: "documents".to_string(),
            storage_key: "documents".to_string(),
            kind: CollectionKind::Documents,
            owner_scoped: false,
            seeds: default_documents(),
            file_rules: FileRules::new(10 * MB),
        }
    }

    /// Messages of every assignment thread. Reads are narrowed per thread
    /// with an `assignmentId` filter rather than by owner.
    pub fn messages() -> Self {
        Self {
            name: "messages".to_string(),
            storage_key: "messages".to_string(),
            kind: CollectionKind::Messages,
            owner_scoped: false,
            seeds: Vec::new(),
            file_rules: FileRules::new(10 * MB),
        }
    }

    /// Reject malformed records before anything is written.
    pub fn validate(&self, record: &Record) -> Result<()> {
        if record.owner_key.trim().is_empty() {
            return Err(StoreError::Validation("record has no owner".to_string()));
        }

        if self.kind == CollectionKind::Messages {
            return validate_message(record);
        }

        match record.title() {
            Some(title) if !title.trim().is_empty() => {}
            _ => return Err(StoreError::Validation("title is required".to_string())),
        }

        match self.kind {
            CollectionKind::Assignments => {
                if let Some(amount) = record.get("amount") {
                    match amount.as_f64() {
                        Some(a) if a >= 0.0 => {}
                        _ => {
                            return Err(StoreError::Validation(
                                "amount must be a non-negative number".to_string(),
                            ))
                        }
                    }
                }
            }
            CollectionKind::Documents => {
                if let Some(downloads) = record.get("downloads") {
                    if downloads.as_u64().is_none() {
                        return Err(StoreError::Validation(
                            "downloads must be a non-negative integer".to_string(),
                        ));
                    }
                }
            }
            CollectionKind::Messages => {}
        }

        Ok(())
    }
}

fn validate_message(record: &Record) -> Result<()> {
    let blank = |key: &str| record.get_str(key).map_or(true, |v| v.trim().is_empty());

    if blank("assignmentId") {
        return Err(StoreError::Validation("Assignment ID is required".to_string()));
    }
    if blank("text") && blank("fileName") && record.attachments.is_empty() {
        return Err(StoreError::Validation(
            "Message must contain text or a file attachment".to_string(),
        ));
    }
    Ok(())
}

fn seed_document(
    id: &str,
    title: &str,
    category: &str,
    subject: &str,
    downloads: u64,
    day: (i32, u32, u32),
    file_type: &str,
    file_size: &str,
) -> Record {
    let mut record = Record::new("Admin")
        .with_id(id)
        .with_status(RecordStatus::Completed)
        .with_field("title", title)
        .with_field("category", category)
        .with_field("subject", subject)
        .with_field("downloads", downloads)
        .with_field("fileUrl", "#")
        .with_field("fileType", file_type)
        .with_field("fileSize", Value::from(file_size));

    let uploaded = Utc.with_ymd_and_hms(day.0, day.1, day.2, 0, 0, 0).single();
    record.created_at = uploaded;
    record.updated_at = uploaded;
    record
}

/// Starter library shown before anyone has uploaded anything.
pub fn default_documents() -> Vec<Record> {
    vec![
        seed_document("1", "Calculus Notes", "notes", "mathematics", 120, (2025, 10, 1), "pdf", "2.4 MB"),
        seed_document("2", "Physics Past Paper", "past-papers", "physics", 85, (2025, 9, 28), "pdf", "1.8 MB"),
        seed_document("3", "Biology Study Guide", "guides", "biology", 60, (2025, 9, 30), "docx", "3.2 MB"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_validation() {
        let spec = CollectionSpec::questions();

        let ok = Record::new("alice").with_field("title", "Essay").with_field("amount", 5);
        assert!(spec.validate(&ok).is_ok());

        let no_title = Record::new("alice").with_field("amount", 5);
        assert!(matches!(spec.validate(&no_title), Err(StoreError::Validation(_))));

        let negative = Record::new("alice").with_field("title", "Essay").with_field("amount", -1);
        assert!(spec.validate(&negative).is_err());

        let no_owner = Record::new("  ").with_field("title", "Essay");
        assert!(spec.validate(&no_owner).is_err());
    }

    #[test]
    fn test_document_validation() {
        let spec = CollectionSpec::documents();
        let bad = Record::new("Admin").with_field("title", "Notes").with_field("downloads", "many");
        assert!(spec.validate(&bad).is_err());

        for seed in &spec.seeds {
            assert!(spec.validate(seed).is_ok());
        }
    }

    #[test]
    fn test_file_rules() {
        let rules = FileRules::new(10 * MB);

        assert!(rules.check(&FileUpload::new("a.pdf", "application/pdf", vec![1; 10])).is_ok());
        assert!(rules.check(&FileUpload::new("a.pdf", "application/pdf", Vec::new())).is_err());
        assert!(rules.check(&FileUpload::new("a.exe", "application/x-msdownload", vec![1])).is_err());

        let err = rules
            .check(&FileUpload::new("big.pdf", "application/pdf", vec![0; 10 * MB + 1]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: File must be smaller than 10MB");
    }

    #[test]
    fn test_message_validation() {
        let spec = CollectionSpec::messages();

        let text = Record::new("alice").with_field("assignmentId", "a1").with_field("text", "Hi");
        assert!(spec.validate(&text).is_ok());

        let file_only = Record::new("alice").with_field("assignmentId", "a1").with_field("fileName", "draft.pdf");
        assert!(spec.validate(&file_only).is_ok());

        let no_thread = Record::new("alice").with_field("text", "Hi");
        let err = spec.validate(&no_thread).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Assignment ID is required");

        let empty = Record::new("alice").with_field("assignmentId", "a1").with_field("text", "  ");
        assert!(matches!(spec.validate(&empty), Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_tutor_queue_shares_storage() {
        let student = CollectionSpec::questions();
        let tutor = CollectionSpec::tutor_queue();
        assert_eq!(student.storage_key, tutor.storage_key);
        assert!(student.owner_scoped);
        assert!(!tutor.owner_scoped);
    }
}
