//! Command-line surface
//!
//! Each subcommand opens the store it needs, runs one dashboard action and
//! renders the result as text (or JSON with `--json`).

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use studyglade_client::ApiClient;
use studyglade_sync::commands::{self, NewDocument, NewMessage, NewQuestion};
use studyglade_sync::views::{self, DashboardStats, ReportSnapshot};
use studyglade_sync::{
    stripe_outcome, CollectionSpec, FileAdapter, FileUpload, LocalAdapter, MpesaCallback, Record,
    RecordFilter, RecordStatus, RemoteApi, SyncedCollectionStore,
};
use tracing::{debug, info};

use crate::config::{ConfigOverrides, StudyGladeConfig};

#[derive(Debug, Parser)]
#[command(name = "studyglade")]
#[command(about = "StudyGlade questions, tutoring and document library")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "studyglade.toml")]
    pub config: PathBuf,

    /// Directory for local collections
    #[arg(short, long, env = "STUDYGLADE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// API base URL (overrides config file)
    #[arg(long, env = "STUDYGLADE_API_URL")]
    pub api_url: Option<String>,

    /// API bearer token
    #[arg(long, env = "STUDYGLADE_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Act as this user
    #[arg(short, long, env = "STUDYGLADE_OWNER")]
    pub owner: Option<String>,

    /// Never contact the API
    #[arg(long)]
    pub offline: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            data_dir: self.data_dir.clone(),
            api_url: self.api_url.clone(),
            api_token: self.api_token.clone(),
            owner: self.owner.clone(),
            offline: self.offline,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Your questions
    #[command(subcommand)]
    Questions(QuestionCommands),

    /// Every student's assignments
    #[command(subcommand)]
    Tutor(TutorCommands),

    /// Assignment threads between student and tutor
    #[command(subcommand)]
    Messages(MessageCommands),

    /// Document library
    #[command(subcommand)]
    Docs(DocCommands),

    /// Apply a payment provider's result
    #[command(subcommand)]
    Payment(PaymentCommands),

    /// Dashboard counters
    Stats {
        /// Count the whole tutor queue instead of your own questions
        #[arg(long)]
        tutor: bool,

        /// Admin report over every assignment
        #[arg(long, conflicts_with = "tutor")]
        report: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum QuestionCommands {
    /// List your questions
    List {
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Post a new question
    Post(PostArgs),

    /// Quote a price and wait for payment
    Pay {
        id: String,
        #[arg(short, long, default_value = "1")]
        pages: u32,
    },

    /// Dispute an assignment
    Dispute {
        id: String,
        #[arg(short, long)]
        reason: String,
    },

    /// Attach a file to a question
    Attach { id: String, file: PathBuf },
}

#[derive(Debug, Args)]
pub struct PostArgs {
    #[arg(short, long)]
    pub title: String,
    #[arg(short, long, default_value = "")]
    pub description: String,
    #[arg(long, default_value = "")]
    pub subject: String,
    #[arg(long, default_value = "")]
    pub topic: String,
    #[arg(long)]
    pub deadline: Option<String>,
    /// Your offer
    #[arg(short, long, default_value = "0")]
    pub amount: f64,
}

#[derive(Debug, Subcommand)]
pub enum TutorCommands {
    /// List the assignment queue
    List {
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Deliver an answer file
    Answer { id: String, file: PathBuf },
}

#[derive(Debug, Subcommand)]
pub enum MessageCommands {
    /// Show a thread, oldest message first
    List { assignment_id: String },

    /// Post to a thread
    Send {
        assignment_id: String,
        #[arg(short = 'm', long, default_value = "")]
        text: String,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DocSort {
    Recent,
    Popular,
}

#[derive(Debug, Subcommand)]
pub enum DocCommands {
    /// Browse the library
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long, value_enum, default_value = "recent")]
        sort: DocSort,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Upload a document
    Upload {
        file: PathBuf,
        #[arg(short, long)]
        title: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        subject: Option<String>,
    },

    /// Count a download and print the file location
    Download { id: String },

    /// Known categories and subjects
    Filters,
}

#[derive(Debug, Subcommand)]
pub enum PaymentCommands {
    /// M-Pesa STK push callback body (JSON file)
    Mpesa { id: String, callback: PathBuf },

    /// Stripe payment intent status
    Stripe { id: String, status: String },
}

/// Everything a command needs to open stores.
pub struct App {
    config: StudyGladeConfig,
    adapter: Arc<dyn LocalAdapter>,
    remote: Option<Arc<dyn RemoteApi>>,
    json: bool,
}

impl App {
    pub async fn new(config: StudyGladeConfig, json: bool) -> anyhow::Result<Self> {
        let adapter = FileAdapter::open(&config.storage.data_dir)
            .await
            .with_context(|| format!("opening {}", config.storage.data_dir.display()))?;

        let remote = if config.api.enabled {
            let client: Arc<dyn RemoteApi> = Arc::new(ApiClient::new(config.client_config())?);
            Some(client)
        } else {
            info!("API disabled, working locally");
            None
        };

        Ok(Self {
            config,
            adapter: Arc::new(adapter),
            remote,
            json,
        })
    }

    async fn open(&self, spec: CollectionSpec) -> anyhow::Result<SyncedCollectionStore> {
        let mut store = SyncedCollectionStore::new(spec, self.adapter.clone());
        if let Some(remote) = &self.remote {
            store = store.with_remote(remote.clone());
        }

        let mut notices = store.subscribe();
        store.initialize(self.config.session.owner.as_deref()).await?;
        if let Ok(notice) = notices.try_recv() {
            eprintln!("{}", notice.user_message());
        }
        debug!(owner = ?store.owner(), mode = %store.mode(), "Store ready");
        Ok(store)
    }

    /// Run one command and return what to print.
    pub async fn run(&self, command: Command) -> anyhow::Result<String> {
        match command {
            Command::Questions(cmd) => self.questions(cmd).await,
            Command::Tutor(cmd) => self.tutor(cmd).await,
            Command::Messages(cmd) => self.messages(cmd).await,
            Command::Docs(cmd) => self.docs(cmd).await,
            Command::Payment(cmd) => self.payment(cmd).await,
            Command::Stats { report: true, .. } => {
                let store = self.open(CollectionSpec::tutor_queue()).await?;
                let report = ReportSnapshot::from_records(store.records(), chrono::Utc::now());
                if self.json {
                    return Ok(serde_json::to_string_pretty(&report)?);
                }
                Ok(format_report(&report))
            }
            Command::Stats { tutor, .. } => {
                let spec = if tutor {
                    CollectionSpec::tutor_queue()
                } else {
                    CollectionSpec::questions()
                };
                let store = self.open(spec).await?;
                let stats = DashboardStats::from_records(store.records());
                if self.json {
                    return Ok(serde_json::to_string_pretty(&stats)?);
                }
                Ok(format_stats(&stats))
            }
        }
    }

    async fn questions(&self, cmd: QuestionCommands) -> anyhow::Result<String> {
        let mut store = self.open(CollectionSpec::questions()).await?;

        let record = match cmd {
            QuestionCommands::List { status } => {
                load_with_status(&mut store, status).await?;
                return self.render_list(store.records());
            }
            QuestionCommands::Post(args) => {
                let question = NewQuestion {
                    title: args.title,
                    description: args.description,
                    subject: args.subject,
                    topic: args.topic,
                    deadline: args.deadline,
                    amount: args.amount,
                };
                commands::post_question(&mut store, question).await?
            }
            QuestionCommands::Pay { id, pages } => commands::submit_payment(&mut store, &id, pages).await?,
            QuestionCommands::Dispute { id, reason } => {
                commands::report_dispute(&mut store, &id, &reason).await?
            }
            QuestionCommands::Attach { id, file } => {
                let upload = read_upload(&file).await?;
                store.attach_file(&id, &upload).await?
            }
        };

        self.render_record(&record)
    }

    async fn tutor(&self, cmd: TutorCommands) -> anyhow::Result<String> {
        let mut store = self.open(CollectionSpec::tutor_queue()).await?;

        match cmd {
            TutorCommands::List { status } => {
                load_with_status(&mut store, status).await?;
                self.render_list(store.records())
            }
            TutorCommands::Answer { id, file } => {
                let upload = read_upload(&file).await?;
                let record = commands::upload_answer(&mut store, &id, &upload).await?;
                self.render_record(&record)
            }
        }
    }

    async fn messages(&self, cmd: MessageCommands) -> anyhow::Result<String> {
        let mut store = self.open(CollectionSpec::messages()).await?;

        match cmd {
            MessageCommands::List { assignment_id } => {
                let thread = commands::list_messages(&mut store, &assignment_id).await?;
                if self.json {
                    return Ok(serde_json::to_string_pretty(&thread)?);
                }
                if thread.is_empty() {
                    return Ok("No messages".to_string());
                }
                Ok(thread.iter().map(format_message).collect::<Vec<_>>().join("\n"))
            }
            MessageCommands::Send {
                assignment_id,
                text,
                file,
            } => {
                let file = match file {
                    Some(path) => Some(read_upload(&path).await?),
                    None => None,
                };
                let message = NewMessage {
                    assignment_id,
                    text,
                    file,
                };
                let sent = commands::send_message(&mut store, message).await?;
                if self.json {
                    return Ok(serde_json::to_string_pretty(&sent)?);
                }
                Ok(format_message(&sent))
            }
        }
    }

    async fn docs(&self, cmd: DocCommands) -> anyhow::Result<String> {
        let mut store = self.open(CollectionSpec::documents()).await?;

        match cmd {
            DocCommands::List {
                category,
                subject,
                search,
                sort,
                limit,
            } => {
                let mut filter = RecordFilter::new();
                if let Some(category) = category {
                    filter = filter.with_field("category", category);
                }
                if let Some(subject) = subject {
                    filter = filter.with_field("subject", subject);
                }
                if let Some(search) = search {
                    filter = filter.with_search(search);
                }

                let records = store.load(filter).await?;
                let sorted: Vec<Record> = match sort {
                    DocSort::Recent => views::recent(records, limit),
                    DocSort::Popular => views::popular(records, limit),
                }
                .into_iter()
                .cloned()
                .collect();
                self.render_list(&sorted)
            }
            DocCommands::Upload {
                file,
                title,
                category,
                subject,
            } => {
                let document = NewDocument {
                    title,
                    category,
                    subject,
                    file: read_upload(&file).await?,
                };
                let record = commands::upload_document(&mut store, document).await?;
                self.render_record(&record)
            }
            DocCommands::Download { id } => {
                let record = commands::download_document(&mut store, &id).await?;
                if self.json {
                    return self.render_record(&record);
                }
                let location = record
                    .attachments
                    .first()
                    .map(|a| a.url.as_str())
                    .or_else(|| record.get_str("fileUrl"))
                    .unwrap_or("#");
                Ok(format!(
                    "{} ({} downloads)\n{}",
                    record.title().unwrap_or("untitled"),
                    record.get_u64("downloads").unwrap_or(0),
                    location
                ))
            }
            DocCommands::Filters => {
                if self.json {
                    return Ok(serde_json::to_string_pretty(&json!({
                        "categories": views::DEFAULT_CATEGORIES,
                        "subjects": views::DEFAULT_SUBJECTS,
                    }))?);
                }
                Ok(format!(
                    "Categories: {}\nSubjects: {}",
                    views::DEFAULT_CATEGORIES.join(", "),
                    views::DEFAULT_SUBJECTS.join(", ")
                ))
            }
        }
    }

    async fn payment(&self, cmd: PaymentCommands) -> anyhow::Result<String> {
        let mut store = self.open(CollectionSpec::questions()).await?;

        let (id, outcome) = match cmd {
            PaymentCommands::Mpesa { id, callback } => {
                let body = tokio::fs::read_to_string(&callback)
                    .await
                    .with_context(|| format!("reading {}", callback.display()))?;
                let body: serde_json::Value = serde_json::from_str(&body)?;
                let callback = MpesaCallback::parse(&body)?;
                info!(
                    receipt = ?callback.receipt_number,
                    result_code = callback.result_code,
                    "M-Pesa callback parsed"
                );
                (id, callback.outcome())
            }
            PaymentCommands::Stripe { id, status } => match stripe_outcome(&status) {
                Some(outcome) => (id, outcome),
                None => bail!("payment intent status '{}' is not final", status),
            },
        };

        let record = commands::record_payment(&mut store, &id, outcome).await?;
        self.render_record(&record)
    }

    fn render_record(&self, record: &Record) -> anyhow::Result<String> {
        if self.json {
            return Ok(serde_json::to_string_pretty(record)?);
        }
        Ok(format_record(record))
    }

    fn render_list(&self, records: &[Record]) -> anyhow::Result<String> {
        if self.json {
            return Ok(serde_json::to_string_pretty(records)?);
        }
        if records.is_empty() {
            return Ok("No records".to_string());
        }
        Ok(records.iter().map(format_record).collect::<Vec<_>>().join("\n"))
    }
}

async fn load_with_status(store: &mut SyncedCollectionStore, status: Option<String>) -> anyhow::Result<()> {
    let mut filter = RecordFilter::new();
    if let Some(status) = status {
        filter = filter.with_status(status.parse::<RecordStatus>()?);
    }
    store.load(filter).await?;
    Ok(())
}

async fn read_upload(path: &Path) -> anyhow::Result<FileUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(FileUpload::new(name, guess_mime_type(path), bytes))
}

/// MIME type from the file extension.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" | "md" => "text/plain",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

fn format_record(record: &Record) -> String {
    let mut line = format!(
        "[{}] {} ({})",
        record.id().unwrap_or("-"),
        record.title().unwrap_or("untitled"),
        record.status()
    );
    if let Some(subject) = record.get_str("subject").filter(|s| !s.is_empty()) {
        line.push_str(&format!(" {}", subject));
    }
    if let Some(amount) = record.get_f64("amount") {
        line.push_str(&format!(" ${:.2}", amount));
    }
    if let Some(downloads) = record.get_u64("downloads") {
        line.push_str(&format!(" {} downloads", downloads));
    }
    if !record.attachments.is_empty() {
        line.push_str(&format!(" +{} files", record.attachments.len()));
    }
    line
}

fn format_message(message: &Record) -> String {
    let mut line = format!(
        "[{}] {}: {}",
        message
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default(),
        message.owner_key,
        message.get_str("text").unwrap_or("")
    );
    for attachment in &message.attachments {
        line.push_str(&format!(" +{}", attachment.name));
    }
    line
}

fn format_report(report: &ReportSnapshot) -> String {
    let mut out = format!(
        "Assignments: {}\nOwners: {}\nPayments: {}",
        report.total_assignments, report.total_owners, report.total_payments
    );
    for payment in &report.latest_payments {
        out.push_str(&format!(
            "\n  {} {} ${:.2} {}",
            payment.record_id.as_deref().unwrap_or("-"),
            payment.title.as_deref().unwrap_or("untitled"),
            payment.amount,
            payment.owner_key
        ));
    }
    out
}

fn format_stats(stats: &DashboardStats) -> String {
    format!(
        "Total: {}\nPending: {}\nCompleted: {}\nEarnings: ${:.2}\nSubjects: {}",
        stats.total, stats.pending, stats.completed, stats.earnings, stats.subjects
    )
}
