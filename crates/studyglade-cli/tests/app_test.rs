//! End-to-end command runs against a temporary data directory

use clap::Parser;
use studyglade_cli::{App, Cli, StudyGladeConfig};
use tempfile::TempDir;

async fn run(dir: &TempDir, args: &[&str]) -> anyhow::Result<String> {
    let data_dir = dir.path().join("data");
    let mut argv = vec![
        "studyglade".to_string(),
        "--data-dir".to_string(),
        data_dir.display().to_string(),
    ];
    argv.extend(args.iter().map(|a| a.to_string()));

    let cli = Cli::parse_from(argv);
    let mut config = StudyGladeConfig::default();
    config.apply(cli.overrides());

    let app = App::new(config, cli.json).await?;
    app.run(cli.command).await
}

#[tokio::test]
async fn test_offline_question_flow() {
    let dir = TempDir::new().unwrap();

    let posted = run(
        &dir,
        &["--offline", "--owner", "alice", "questions", "post", "--title", "Essay", "--amount", "5", "--json"],
    )
    .await
    .unwrap();
    let posted: serde_json::Value = serde_json::from_str(&posted).unwrap();
    assert_eq!(posted["ownerKey"], "alice");
    assert_eq!(posted["status"], "pending");
    let id = posted["id"].as_str().unwrap().to_string();

    let paid = run(&dir, &["--offline", "--owner", "alice", "questions", "pay", &id, "--pages", "3"])
        .await
        .unwrap();
    assert!(paid.contains("pending_payment"));
    assert!(paid.contains("$9.00"));

    let stripe = run(&dir, &["--offline", "--owner", "alice", "payment", "stripe", &id, "succeeded"])
        .await
        .unwrap();
    assert!(stripe.contains("(completed)"));

    // Another user sees none of it
    let bob = run(&dir, &["--offline", "--owner", "bob", "questions", "list"]).await.unwrap();
    assert_eq!(bob, "No records");

    let tutor = run(&dir, &["--offline", "--owner", "tutor", "stats", "--tutor"]).await.unwrap();
    assert!(tutor.contains("Completed: 1"));
    assert!(tutor.contains("Earnings: $9.00"));
}

#[tokio::test]
async fn test_offline_library() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("summary.txt");
    std::fs::write(&file, "osmosis").unwrap();

    let listed = run(&dir, &["--offline", "docs", "list", "--sort", "popular"]).await.unwrap();
    assert!(listed.starts_with("[1] Calculus Notes"));

    let uploaded = run(
        &dir,
        &["--offline", "--owner", "alice", "docs", "upload", file.to_str().unwrap(), "--title", "Osmosis", "--json"],
    )
    .await
    .unwrap();
    let uploaded: serde_json::Value = serde_json::from_str(&uploaded).unwrap();
    assert_eq!(uploaded["category"], "other");
    assert_eq!(uploaded["fileType"], "text/plain");

    let downloaded = run(&dir, &["--offline", "docs", "download", "2"]).await.unwrap();
    assert!(downloaded.starts_with("Physics Past Paper (86 downloads)"));
}

#[tokio::test]
async fn test_unreachable_api_falls_back() {
    let dir = TempDir::new().unwrap();

    let output = run(
        &dir,
        &["--api-url", "http://127.0.0.1:9/api", "--owner", "alice", "questions", "post", "--title", "Essay"],
    )
    .await
    .unwrap();
    assert!(output.contains("Essay (pending)"));

    let listed = run(&dir, &["--offline", "--owner", "alice", "questions", "list"]).await.unwrap();
    assert!(listed.contains("Essay"));
}

#[tokio::test]
async fn test_unknown_status_filter() {
    let dir = TempDir::new().unwrap();
    let err = run(&dir, &["--offline", "questions", "list", "--status", "archived"])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown status"));
}

#[tokio::test]
async fn test_offline_messages_and_report() {
    let dir = TempDir::new().unwrap();

    let posted = run(
        &dir,
        &["--offline", "--owner", "alice", "questions", "post", "--title", "Essay", "--json"],
    )
    .await
    .unwrap();
    let posted: serde_json::Value = serde_json::from_str(&posted).unwrap();
    let id = posted["id"].as_str().unwrap().to_string();

    run(&dir, &["--offline", "--owner", "alice", "messages", "send", &id, "-m", "Is Friday ok?"])
        .await
        .unwrap();
    run(&dir, &["--offline", "--owner", "tutor", "messages", "send", &id, "-m", "Friday works"])
        .await
        .unwrap();

    let thread = run(&dir, &["--offline", "messages", "list", &id]).await.unwrap();
    let lines: Vec<&str> = thread.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("alice: Is Friday ok?"));
    assert!(lines[1].ends_with("tutor: Friday works"));

    let empty = run(&dir, &["--offline", "messages", "send", &id]).await.unwrap_err();
    assert!(empty.to_string().contains("Message must contain text or a file attachment"));

    run(&dir, &["--offline", "--owner", "alice", "questions", "pay", &id, "--pages", "2"])
        .await
        .unwrap();
    run(&dir, &["--offline", "--owner", "alice", "payment", "stripe", &id, "succeeded"])
        .await
        .unwrap();

    let report = run(&dir, &["--offline", "stats", "--report"]).await.unwrap();
    assert!(report.starts_with("Assignments: 1\nOwners: 1\nPayments: 1"));
    assert!(report.contains("Essay $6.00 alice"));
}
