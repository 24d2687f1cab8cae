#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for sending mail over SMTP and managing mailboxes over IMAP

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use mailtoolbox::dispatch::BatchSummary;
use mailtoolbox::message::load_attachments;
use mailtoolbox::{
    BodyTemplate, ConnectionConfig, DispatchCoordinator, Flag, ImapSession, MailItem, Message,
    Outcome, SecurityMode, TemplateEngine, TemplateRenderer, export,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailtool")]
#[command(about = "Send mail over SMTP and manage mailboxes over IMAP")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Override the configured transport security (auto, starttls, ssl, none)
    #[arg(long, global = true)]
    security: Option<SecurityMode>,
}

#[derive(Subcommand)]
enum Command {
    /// Send one message
    Send {
        /// Recipient (repeatable)
        #[arg(long, required = true)]
        to: Vec<String>,

        #[arg(long)]
        cc: Vec<String>,

        #[arg(long)]
        bcc: Vec<String>,

        #[arg(long)]
        subject: String,

        /// Plain-text body
        #[arg(long)]
        text: Option<String>,

        /// HTML body
        #[arg(long)]
        html: Option<String>,

        /// Render this template as the HTML body
        #[arg(long, conflicts_with = "html")]
        template: Option<String>,

        /// Directory templates are loaded from
        #[arg(long, default_value = "templates")]
        template_dir: PathBuf,

        /// Template context as a JSON object
        #[arg(long, default_value = "{}")]
        context: String,

        /// File to attach (repeatable)
        #[arg(long)]
        attach: Vec<PathBuf>,
    },

    /// Send an individual message to every recipient in a file
    Bulk {
        /// File with one recipient per line
        recipients: PathBuf,

        #[arg(long)]
        subject: String,

        #[arg(long)]
        text: Option<String>,

        #[arg(long)]
        html: Option<String>,

        #[arg(long, conflicts_with_all = ["html", "text"])]
        template: Option<String>,

        #[arg(long, default_value = "templates")]
        template_dir: PathBuf,

        #[arg(long, default_value = "{}")]
        context: String,

        /// Maximum concurrent SMTP sessions
        #[arg(long, default_value = "4")]
        max_in_flight: usize,
    },

    /// List available IMAP folders
    Folders,

    /// List emails
    List {
        /// Folder to list from
        #[arg(long, default_value = "INBOX")]
        folder: String,

        /// Maximum number of emails to show
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Show only unseen emails
        #[arg(long)]
        unseen: bool,

        /// Show emails since this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        since: Option<NaiveDate>,

        /// Show emails before this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        before: Option<NaiveDate>,
    },

    /// Show a single email by UID
    Show {
        uid: u32,

        #[arg(long, default_value = "INBOX")]
        folder: String,
    },

    /// Search emails using an IMAP search query
    Search {
        /// IMAP search query (e.g. "FROM foo@bar.com")
        query: String,

        #[arg(long, default_value = "INBOX")]
        folder: String,

        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Add or remove flags
    Flag {
        #[arg(required = true)]
        uids: Vec<u32>,

        #[arg(long, default_value = "INBOX")]
        folder: String,

        /// Flag to add, e.g. `seen` or `\Flagged` (repeatable)
        #[arg(long)]
        add: Vec<String>,

        /// Flag to remove (repeatable)
        #[arg(long)]
        remove: Vec<String>,
    },

    /// Mark emails deleted (run `expunge` to remove them)
    Delete {
        #[arg(required = true)]
        uids: Vec<u32>,

        #[arg(long, default_value = "INBOX")]
        folder: String,
    },

    /// Permanently remove deleted emails
    Expunge {
        #[arg(long, default_value = "INBOX")]
        folder: String,
    },

    /// Move emails to another folder
    Move {
        #[arg(required = true)]
        uids: Vec<u32>,

        /// Destination folder
        #[arg(long)]
        to: String,

        #[arg(long, default_value = "INBOX")]
        folder: String,
    },

    /// Export emails as text, JSON or .eml files
    Export {
        #[arg(long, value_enum, default_value = "eml")]
        format: ExportFormat,

        #[arg(long, default_value = "INBOX")]
        folder: String,

        #[arg(long, default_value = "ALL")]
        query: String,

        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ExportFormat {
    Text,
    Json,
    Eml,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("Invalid date '{s}': {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Send { .. } | Command::Bulk { .. } => run_smtp(&args).await,
        _ => {
            let config = override_security(ConnectionConfig::imap_from_env()?, &args);
            let mut session = ImapSession::open(config).await?;
            let result = run_imap(&mut session, &args).await;
            session.close().await;
            result
        }
    }
}

fn override_security(config: ConnectionConfig, args: &Args) -> ConnectionConfig {
    match args.security {
        Some(mode) => config.with_security_mode(mode),
        None => config,
    }
}

fn parse_context(context: &str) -> anyhow::Result<serde_json::Value> {
    serde_json::from_str(context).map_err(|e| anyhow::anyhow!("Invalid --context JSON: {e}"))
}

async fn run_smtp(args: &Args) -> anyhow::Result<()> {
    let config = override_security(ConnectionConfig::smtp_from_env()?, args);

    match &args.command {
        Command::Send {
            to,
            cc,
            bcc,
            subject,
            text,
            html,
            template,
            template_dir,
            context,
            attach,
        } => {
            let mut message = Message::new(subject.as_str());
            message.to.clone_from(to);
            message.cc.clone_from(cc);
            message.bcc.clone_from(bcc);
            message.text_body.clone_from(text);
            message.html_body.clone_from(html);
            message.attachments = load_attachments(attach).await;
            if let Some(name) = template {
                let renderer = TemplateRenderer::from_dir(template_dir);
                message.html_body = Some(renderer.render(name, &parse_context(context)?)?);
            }

            let report = DispatchCoordinator::new(config).send(&message).await?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Sent {}", report.message_id);
                for rejection in &report.rejected {
                    println!(
                        "  rejected {} ({}): {}",
                        rejection.recipient, rejection.code, rejection.message
                    );
                }
            }
        }
        Command::Bulk {
            recipients,
            subject,
            text,
            html,
            template,
            template_dir,
            context,
            max_in_flight,
        } => {
            let recipients = read_recipients(recipients).await?;
            let body = match (template, html, text) {
                (Some(name), _, _) => BodyTemplate::Template {
                    name: name.clone(),
                    context: parse_context(context)?,
                },
                (None, Some(html), _) => BodyTemplate::Html(html.clone()),
                (None, None, Some(text)) => BodyTemplate::Text(text.clone()),
                (None, None, None) => anyhow::bail!("One of --text, --html or --template is required"),
            };
            let coordinator = DispatchCoordinator::new(config)
                .with_templates(TemplateRenderer::from_dir(template_dir))
                .with_max_in_flight(*max_in_flight);
            let results = coordinator.send_bulk(&recipients, subject, &body).await;
            let summary = BatchSummary::of(&results);

            if args.json {
                let entries: Vec<_> = results
                    .iter()
                    .map(|r| {
                        let (status, detail) = match &r.outcome {
                            Outcome::Sent { message_id } => ("sent", message_id.clone()),
                            Outcome::Rejected { code, message } => {
                                ("rejected", format!("{code} {message}"))
                            }
                            Outcome::Failed(e) => ("failed", e.to_string()),
                            Outcome::Cancelled => ("cancelled", String::new()),
                        };
                        serde_json::json!({
                            "recipient": r.recipient,
                            "status": status,
                            "detail": detail,
                        })
                    })
                    .collect();
                let out = serde_json::json!({ "results": entries, "summary": summary });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for r in &results {
                    match &r.outcome {
                        Outcome::Sent { message_id } => {
                            println!("sent      {} {}", r.recipient, message_id);
                        }
                        Outcome::Rejected { code, message } => {
                            println!("rejected  {} {} {}", r.recipient, code, message);
                        }
                        Outcome::Failed(e) => println!("failed    {} {}", r.recipient, e),
                        Outcome::Cancelled => println!("cancelled {}", r.recipient),
                    }
                }
                println!(
                    "\n{} sent, {} rejected, {} failed",
                    summary.sent, summary.rejected, summary.failed
                );
            }
        }
        // IMAP commands are handled by run_imap.
        _ => {}
    }
    Ok(())
}

async fn read_recipients(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(ToString::to_string)
        .collect())
}

async fn run_imap(session: &mut ImapSession, args: &Args) -> anyhow::Result<()> {
    match &args.command {
        Command::Folders => {
            let folders = session.list_mailboxes().await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&folders)?);
            } else {
                for folder in &folders {
                    match folder.role {
                        Some(role) => println!("{} ({role})", folder.name),
                        None => println!("{}", folder.name),
                    }
                }
            }
        }
        Command::List {
            folder,
            limit,
            unseen,
            since,
            before,
        } => {
            let criteria = list_criteria(*unseen, *since, *before);
            session.examine(folder).await?;
            let mut uids = session.search(&criteria).await?;
            // Newest first.
            uids.reverse();
            uids.truncate(*limit);
            let emails = fetch_found(session, &uids).await?;
            print_emails(&emails, args.json)?;
        }
        Command::Show { uid, folder } => {
            session.examine(folder).await?;
            let email = session.fetch(*uid).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&email)?);
            } else {
                print_email_detail(&email);
            }
        }
        Command::Search {
            query,
            folder,
            limit,
        } => {
            session.examine(folder).await?;
            let mut uids = session.search(query).await?;
            uids.truncate(*limit);
            let emails = fetch_found(session, &uids).await?;
            print_emails(&emails, args.json)?;
        }
        Command::Flag {
            uids,
            folder,
            add,
            remove,
        } => {
            let add: Vec<Flag> = add.iter().map(|f| Flag::from(f.as_str())).collect();
            let remove: Vec<Flag> = remove.iter().map(|f| Flag::from(f.as_str())).collect();
            session.select(folder).await?;
            session.mutate_flags(uids, &add, &remove).await?;
            println!("Updated flags on {} email(s)", uids.len());
        }
        Command::Delete { uids, folder } => {
            session.select(folder).await?;
            session.delete(uids).await?;
            println!("Marked {} email(s) deleted", uids.len());
        }
        Command::Expunge { folder } => {
            session.select(folder).await?;
            let removed = session.expunge().await?;
            println!("Expunged {} email(s)", removed.len());
        }
        Command::Move { uids, to, folder } => {
            session.select(folder).await?;
            session.move_messages(uids, to).await?;
            println!("Moved {} email(s) to {to}", uids.len());
        }
        Command::Export {
            format,
            folder,
            query,
            out,
        } => {
            tokio::fs::create_dir_all(out).await?;
            match format {
                ExportFormat::Text => {
                    let path = export::download_mail_text(session, folder, out).await?;
                    println!("{}", path.display());
                }
                ExportFormat::Json => {
                    let path = out.join("mail.json");
                    export::download_mail_json(session, folder, query, Some(&path)).await?;
                    println!("{}", path.display());
                }
                ExportFormat::Eml => {
                    let paths = export::download_mail_eml(session, folder, query, out).await?;
                    for path in &paths {
                        println!("{}", path.display());
                    }
                }
            }
        }
        Command::Send { .. } | Command::Bulk { .. } => {}
    }
    Ok(())
}

fn list_criteria(unseen: bool, since: Option<NaiveDate>, before: Option<NaiveDate>) -> String {
    let mut parts = Vec::new();
    if unseen {
        parts.push("UNSEEN".to_string());
    }
    if let Some(date) = since {
        parts.push(format!("SINCE {}", date.format("%d-%b-%Y")));
    }
    if let Some(date) = before {
        parts.push(format!("BEFORE {}", date.format("%d-%b-%Y")));
    }
    if parts.is_empty() {
        "ALL".to_string()
    } else {
        parts.join(" ")
    }
}

async fn fetch_found(session: &mut ImapSession, uids: &[u32]) -> anyhow::Result<Vec<MailItem>> {
    Ok(session
        .fetch_many(uids)
        .await?
        .into_iter()
        .filter_map(Result::ok)
        .collect())
}

fn print_emails(emails: &[MailItem], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(emails)?);
    } else {
        print_email_table(emails);
    }
    Ok(())
}

fn print_email_table(emails: &[MailItem]) {
    if emails.is_empty() {
        println!("No emails found.");
        return;
    }

    println!("{:<8} {:<20} {:<30} Subject", "UID", "Date", "From");
    println!("{}", "-".repeat(100));

    for email in emails {
        let date = email
            .date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let from = email.from.first().map(ToString::to_string).unwrap_or_default();
        println!(
            "{:<8} {:<20} {:<30} {}",
            email.uid,
            date,
            truncate(&from, 28),
            truncate(&email.subject, 40),
        );
    }

    println!("\n{} email(s)", emails.len());
}

fn print_email_detail(email: &MailItem) {
    let join = |addrs: &[mailtoolbox::imap::MailAddress]| {
        addrs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!("UID:     {}", email.uid);
    if let Some(date) = email.date {
        println!("Date:    {}", date.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("From:    {}", join(&email.from));
    println!("To:      {}", join(&email.to));
    if !email.cc.is_empty() {
        println!("CC:      {}", join(&email.cc));
    }
    println!("Subject: {}", email.subject);
    if let Some(id) = &email.message_id {
        println!("Msg-ID:  {id}");
    }
    if !email.flags.is_empty() {
        let flags: Vec<String> = email.flags.iter().map(ToString::to_string).collect();
        println!("Flags:   {}", flags.join(" "));
    }

    println!("\n--- Body ---\n");
    println!("{}", email.best_text());

    if !email.attachments.is_empty() {
        println!("\n--- Attachments ---");
        for a in &email.attachments {
            println!(
                "  {} ({}, {} bytes)",
                a.filename.as_deref().unwrap_or("(unnamed)"),
                a.content_type,
                a.size
            );
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
