//! Turns commands, free text and menu callbacks into replies.
//!
//! The dispatcher is transport-agnostic: it returns a [`Reply`] that the
//! Telegram handlers deliver. User mistakes never escape as errors; they
//! become ordinary reply text.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::{
    command::{self, Command, Parsed, CATALOG},
    domain::{ChatId, PaymentStatus, UserId},
    errors::{Error, TransferFailure, TransferStage},
    formatting::{self, escape_html},
    messaging::{
        port::MessagingPort,
        types::{Document, InlineKeyboard},
    },
    repository::ApplicantRepository,
    session::{Action, Flow, SessionStore},
    subscription::{format_date, Outcome},
    Result,
};

/// What to send back, in order: messages, then documents, then the keyboard.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reply {
    pub messages: Vec<String>,
    pub documents: Vec<Document>,
    pub keyboard: Option<InlineKeyboard>,
}

impl Reply {
    pub fn text(html: impl Into<String>) -> Self {
        Self {
            messages: vec![html.into()],
            ..Self::default()
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

pub struct Dispatcher {
    repo: Arc<ApplicantRepository>,
    sessions: SessionStore,
    expiring_window_days: i64,
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

impl Dispatcher {
    pub fn new(
        repo: Arc<ApplicantRepository>,
        sessions: SessionStore,
        expiring_window_days: i64,
    ) -> Self {
        Self {
            repo,
            sessions,
            expiring_window_days,
        }
    }

    /// A `/command` message. Any flow in progress is abandoned.
    pub async fn handle_command(&self, user: UserId, text: &str) -> Reply {
        self.handle_command_at(user, text, today()).await
    }

    pub async fn handle_command_at(&self, user: UserId, text: &str, today: NaiveDate) -> Reply {
        let had_flow = self.sessions.clear(user).await;
        match command::parse(text) {
            Ok(Parsed::Ready(Command::Cancel)) => cancelled(had_flow),
            Ok(parsed) => self.run(user, parsed, today).await,
            Err(e) => render_error(&e),
        }
    }

    /// An inline-menu button press.
    pub async fn handle_callback(&self, user: UserId, data: &str) -> Reply {
        self.handle_callback_at(user, data, today()).await
    }

    pub async fn handle_callback_at(&self, user: UserId, data: &str, today: NaiveDate) -> Reply {
        self.sessions.clear(user).await;
        match command::parse_callback(data) {
            Ok(parsed) => self.run(user, parsed, today).await,
            Err(e) => render_error(&e),
        }
    }

    /// Plain text: the next answer of a flow, or a hint when none is running.
    pub async fn handle_text(&self, user: UserId, text: &str) -> Reply {
        self.handle_text_at(user, text, today()).await
    }

    pub async fn handle_text_at(&self, user: UserId, text: &str, today: NaiveDate) -> Reply {
        let Some(flow) = self.sessions.take(user).await else {
            return Reply::text("Send /start for the menu or /help for the command list.")
                .with_keyboard(command::main_menu());
        };

        match command::advance(&flow, text) {
            Ok(parsed) => self.run(user, parsed, today).await,
            Err(e) => {
                // Keep the step so the user can correct the value.
                self.sessions.begin(user, flow.clone()).await;
                let mut reply = render_error(&e);
                reply.messages.push(prompt(&flow));
                reply
            }
        }
    }

    async fn run(&self, user: UserId, parsed: Parsed, today: NaiveDate) -> Reply {
        match parsed {
            Parsed::Incomplete(flow) => {
                let text = prompt(&flow);
                self.sessions.begin(user, flow).await;
                Reply::text(text)
            }
            Parsed::Ready(cmd) => {
                tracing::debug!(user = user.0, command = ?cmd, "executing");
                match self.execute(cmd, today).await {
                    Ok(reply) => reply,
                    Err(e) => render_error(&e),
                }
            }
        }
    }

    pub async fn execute(&self, cmd: Command, today: NaiveDate) -> Result<Reply> {
        let repo = &self.repo;
        let reply = match cmd {
            Command::Start => Reply::text(
                "👋 <b>Applicant management</b>\n\nChoose an action below or send /help.",
            )
            .with_keyboard(command::main_menu()),
            Command::Help => Reply::text(help_text()),
            Command::Cancel => cancelled(false),
            Command::ListPending => Reply::text(formatting::applicant_list(
                "⏳ Pending Applicants",
                "No pending applicants found.",
                &repo.fetch_by_status(PaymentStatus::Pending).await?,
            )),
            Command::ListDone => Reply::text(formatting::applicant_list(
                "✅ Done Applicants",
                "No done applicants found.",
                &repo.fetch_by_status(PaymentStatus::Done).await?,
            )),
            Command::ListArchived => Reply::text(formatting::applicant_list(
                "📦 Archived Applicants",
                "No archived applicants found.",
                &repo.fetch_archived().await?,
            )),
            Command::Find(lookup) => {
                let found = repo.find(&lookup).await?;
                let mut reply = Reply {
                    messages: formatting::applicant_sections(&found.applicant, found.set, today),
                    ..Reply::default()
                };
                reply.documents = repo.attachments(&found.applicant).await;
                if reply.documents.is_empty() {
                    reply.messages.push("📎 No files available.".to_string());
                }
                reply
            }
            Command::MarkPaymentDone(lookup) => {
                payment_reply(repo.set_payment(&lookup, PaymentStatus::Done).await?)
            }
            Command::MarkPaymentPending(lookup) => {
                payment_reply(repo.set_payment(&lookup, PaymentStatus::Pending).await?)
            }
            Command::SetSubscription { lookup, date } => {
                let a = repo.set_subscription(&lookup, date).await?;
                Reply::text(format!(
                    "📅 Subscription for <code>{}</code> now expires on {}.",
                    escape_html(&a.alias_email),
                    format_date(date)
                ))
            }
            Command::ExtendSubscription { lookup, days } => {
                let ext = repo.extend_subscription(&lookup, days, today).await?;
                let previous = ext
                    .previous
                    .map(format_date)
                    .unwrap_or_else(|| "not set".to_string());
                Reply::text(format!(
                    "➕ Subscription for <code>{}</code> extended by {} days.\nPrevious: {}\nNew: {}",
                    escape_html(&ext.applicant.alias_email),
                    ext.days,
                    previous,
                    format_date(ext.new_expiration)
                ))
            }
            Command::Archive(lookup) => {
                let a = repo.move_to_archive(&lookup).await?;
                Reply::text(format!(
                    "🗄️ <code>{}</code> moved to the archive.",
                    escape_html(&a.alias_email)
                ))
            }
            Command::Restore(lookup) => {
                let a = repo.move_to_active(&lookup).await?;
                Reply::text(format!(
                    "♻️ <code>{}</code> restored to active applicants.",
                    escape_html(&a.alias_email)
                ))
            }
            Command::Stats => Reply::text(formatting::stats(&repo.stats().await?)),
            Command::Expired => Reply::text(formatting::subscription_list(
                "❌ Expired Subscriptions",
                "No expired subscriptions.",
                &repo.expired(today).await?,
                today,
            )),
            Command::ExpiringSoon => Reply::text(formatting::subscription_list(
                &format!("⏳ Expiring within {} days", self.expiring_window_days),
                "No subscriptions expiring soon.",
                &repo.expiring(today, self.expiring_window_days).await?,
                today,
            )),
        };
        Ok(reply)
    }
}

/// Send a reply in order. Long messages are split at `limit`; the keyboard
/// rides on the last message. A failed send is logged and the rest of the
/// reply still goes out; the first failure is returned at the end.
pub async fn deliver(
    messenger: &dyn MessagingPort,
    chat_id: ChatId,
    reply: Reply,
    limit: usize,
) -> Result<()> {
    let Reply {
        messages,
        documents,
        keyboard,
    } = reply;

    let mut chunks: Vec<String> = messages
        .iter()
        .flat_map(|m| formatting::chunk_message(m, limit))
        .filter(|c| !c.trim().is_empty())
        .collect();
    let keyboard_text = match keyboard {
        Some(_) => chunks.pop(),
        None => None,
    };

    let mut first_error = None;
    for chunk in &chunks {
        if let Err(e) = messenger.send_html(chat_id, chunk).await {
            tracing::warn!(chat = chat_id.0, error = %e, "failed to send message chunk");
            first_error.get_or_insert(e);
        }
    }

    for doc in documents {
        let name = doc.file_name.clone();
        if let Err(e) = messenger.send_document(chat_id, doc).await {
            tracing::warn!(file = %name, error = %e, "failed to send document");
            first_error.get_or_insert(e);
        }
    }

    if let Some(kb) = keyboard {
        let text = keyboard_text.unwrap_or_else(|| "Choose an action:".to_string());
        if let Err(e) = messenger.send_inline_keyboard(chat_id, &text, kb).await {
            tracing::warn!(chat = chat_id.0, error = %e, "failed to send keyboard");
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn cancelled(had_flow: bool) -> Reply {
    if had_flow {
        Reply::text("Cancelled.")
    } else {
        Reply::text("Nothing to cancel.")
    }
}

fn payment_reply((a, outcome): (crate::applicant::Applicant, Outcome)) -> Reply {
    let status = a.payment.map(|p| p.as_str()).unwrap_or("unknown");
    let alias = escape_html(&a.alias_email);
    match outcome {
        Outcome::Changed => Reply::text(format!(
            "✅ Payment for <code>{alias}</code> set to <b>{status}</b>."
        )),
        Outcome::Unchanged => Reply::text(format!(
            "ℹ️ Payment for <code>{alias}</code> is already <b>{status}</b>."
        )),
    }
}

fn help_text() -> String {
    let mut out = String::from("<b>Commands</b>\n");
    for (name, args, desc) in CATALOG {
        if args.is_empty() {
            out.push_str(&format!("\n/{name} - {desc}"));
        } else {
            out.push_str(&format!("\n/{name} {} - {desc}", escape_html(args)));
        }
    }
    out.push_str("\n\nCommands that need an applicant ask for it when sent without arguments.");
    out
}

/// Question asked for the next step of a flow.
pub fn prompt(flow: &Flow) -> String {
    match flow {
        Flow::AwaitingLookup(action) => {
            let what = match action {
                Action::Find => "to look up",
                Action::MarkPaymentDone => "to mark as paid",
                Action::MarkPaymentPending => "to mark as pending",
                Action::SetSubscription => "whose subscription date to set",
                Action::ExtendSubscription => "whose subscription to extend",
                Action::Archive => "to archive",
                Action::Restore => "to restore",
            };
            format!("🔍 Send the alias email or WhatsApp number of the applicant {what}.\n/cancel to abort.")
        }
        Flow::AwaitingDate { lookup } => format!(
            "📅 Send the new expiration date for <code>{}</code> (YYYY-MM-DD).",
            escape_html(lookup.value())
        ),
        Flow::AwaitingDays { lookup } => format!(
            "➕ Send the number of days to extend <code>{}</code> by.",
            escape_html(lookup.value())
        ),
    }
}

/// User errors become plain replies; backend faults are logged and reported generically.
pub fn render_error(e: &Error) -> Reply {
    if e.is_user_error() {
        tracing::debug!(error = %e, "rejected input");
    }
    match e {
        Error::NotFound(msg) | Error::InvalidArgument(msg) => {
            Reply::text(format!("❌ {}", escape_html(msg)))
        }
        Error::PartialTransfer(failure) => {
            tracing::error!(error = %failure, "archive transfer failed");
            Reply::text(transfer_message(failure))
        }
        other => {
            tracing::error!(error = %other, "command failed");
            Reply::text("⚠️ The database is unavailable right now. Please try again later.")
        }
    }
}

fn transfer_message(f: &TransferFailure) -> String {
    let key = escape_html(&f.key);
    let (from, to) = (f.from.label(), f.to.label());
    match (f.stage, f.source_intact) {
        (TransferStage::DestinationOccupied, _) => format!(
            "⚠️ <code>{key}</code> already exists among {to} applicants; nothing was moved."
        ),
        (_, true) => format!(
            "⚠️ Could not move <code>{key}</code> to {to}. The record is unchanged among {from} applicants."
        ),
        (_, false) => format!(
            "🚨 Moving <code>{key}</code> from {from} to {to} failed midway. Check both sets before retrying."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Bucket, RecordSet},
        testing::{applicant_row, MemoryStore, RecordingMessenger},
    };
    use serde_json::Value;
    use tokio::time::Duration;

    const U: UserId = UserId(7);

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Dispatcher) {
        let store = Arc::new(MemoryStore::default());
        let repo = Arc::new(ApplicantRepository::new(store.clone(), store.clone()));
        let dispatcher = Dispatcher::new(repo, SessionStore::new(Duration::from_secs(600)), 7);
        (store, dispatcher)
    }

    fn payment_of(store: &MemoryStore, alias: &str) -> Option<Value> {
        store
            .rows(RecordSet::Active)
            .into_iter()
            .find(|r| r.get("alias_email") == Some(&Value::String(alias.into())))
            .and_then(|r| r.get("payment").cloned())
    }

    #[tokio::test]
    async fn start_shows_menu() {
        let (_, disp) = setup();
        let reply = disp.handle_command(U, "/start").await;
        assert!(reply.keyboard.is_some());
    }

    #[tokio::test]
    async fn lists_pending() {
        let (store, disp) = setup();
        store.seed(RecordSet::Active, applicant_row("p@x.com", "pending"));
        store.seed(RecordSet::Active, applicant_row("d@x.com", "done"));
        let reply = disp.handle_command(U, "/list-pending").await;
        assert_eq!(reply.messages.len(), 1);
        assert!(reply.messages[0].contains("p@x.com"));
        assert!(!reply.messages[0].contains("d@x.com"));
    }

    #[tokio::test]
    async fn mark_payment_done_twice_is_success_both_times() {
        let (store, disp) = setup();
        store.seed(RecordSet::Active, applicant_row("a@x.com", "pending"));

        let first = disp.handle_command(U, "/mark_payment_done a@x.com").await;
        assert!(first.messages[0].starts_with("✅"));
        assert_eq!(payment_of(&store, "a@x.com"), Some(Value::String("done".into())));

        let second = disp.handle_command(U, "/mark_payment_done a@x.com").await;
        assert!(second.messages[0].contains("already"));
    }

    #[tokio::test]
    async fn unknown_alias_is_a_normal_reply() {
        let (_, disp) = setup();
        let reply = disp.handle_command(U, "/find ghost@x.com").await;
        assert!(reply.messages[0].starts_with("❌"));
        assert!(reply.messages[0].contains("ghost@x.com"));
    }

    #[tokio::test]
    async fn find_attaches_files() {
        let (store, disp) = setup();
        let mut row = applicant_row("a@x.com", "done");
        row.insert(
            "cv_url".into(),
            Value::String("https://h/storage/v1/object/public/cv/a-cv.pdf".into()),
        );
        store.seed(RecordSet::Active, row);
        store.put_file(Bucket::Cv, "a-cv.pdf", b"%PDF");

        let reply = disp.handle_command(U, "/find a@x.com").await;
        assert!(reply.messages.len() > 1);
        assert_eq!(reply.documents.len(), 1);
        assert_eq!(reply.documents[0].file_name, "a-cv.pdf");
    }

    #[tokio::test]
    async fn extend_by_flow_steps() {
        let (store, disp) = setup();
        let mut row = applicant_row("a@x.com", "done");
        row.insert("subscription_expiration".into(), Value::String("2026-01-10".into()));
        store.seed(RecordSet::Active, row);
        let today = d(2026, 1, 1);

        let r = disp.handle_command_at(U, "/extend_subscription", today).await;
        assert!(r.messages[0].contains("alias email"));
        let r = disp.handle_text_at(U, "a@x.com", today).await;
        assert!(r.messages[0].contains("number of days"));
        let r = disp.handle_text_at(U, "many", today).await;
        assert!(r.messages[0].starts_with("❌"));
        let r = disp.handle_text_at(U, "5", today).await;
        assert!(r.messages[0].contains("2026-01-15"), "{:?}", r.messages);

        let r = disp.handle_text_at(U, "5", today).await;
        assert!(r.messages[0].contains("/start"));
    }

    #[tokio::test]
    async fn cancel_clears_the_flow() {
        let (_, disp) = setup();
        disp.handle_command(U, "/archive").await;
        let r = disp.handle_command(U, "/cancel").await;
        assert_eq!(r.messages[0], "Cancelled.");
        let r = disp.handle_command(U, "/cancel").await;
        assert_eq!(r.messages[0], "Nothing to cancel.");
    }

    #[tokio::test]
    async fn archive_then_restore_round_trips() {
        let (store, disp) = setup();
        let original = applicant_row("a@x.com", "done");
        store.seed(RecordSet::Active, original.clone());

        let r = disp.handle_command(U, "/archive a@x.com").await;
        assert!(r.messages[0].contains("archive"));
        assert!(store.rows(RecordSet::Active).is_empty());

        disp.handle_command(U, "/restore a@x.com").await;
        assert_eq!(store.rows(RecordSet::Active), vec![original]);
        assert!(store.rows(RecordSet::Archived).is_empty());
    }

    #[tokio::test]
    async fn failed_insert_reports_source_intact() {
        let (store, disp) = setup();
        store.seed(RecordSet::Active, applicant_row("a@x.com", "done"));
        store.fail_inserts(true);
        let r = disp.handle_command(U, "/archive a@x.com").await;
        assert!(r.messages[0].contains("unchanged"), "{:?}", r.messages);
        assert_eq!(store.rows(RecordSet::Active).len(), 1);
    }

    #[tokio::test]
    async fn failed_rollback_is_reported_as_midway() {
        let (store, disp) = setup();
        store.seed(RecordSet::Active, applicant_row("a@x.com", "done"));
        store.fail_deletes_in(&[RecordSet::Active, RecordSet::Archived]);
        let r = disp.handle_command(U, "/archive a@x.com").await;
        assert!(r.messages[0].contains("failed midway"), "{:?}", r.messages);
        assert!(!r.messages[0].contains("unchanged"));
    }

    #[tokio::test]
    async fn backend_failure_is_generic() {
        let (store, disp) = setup();
        store.set_offline(true);
        let r = disp.handle_command(U, "/stats").await;
        assert!(r.messages[0].contains("unavailable"));
        assert!(!r.messages[0].contains("connection refused"));
    }

    #[tokio::test]
    async fn stats_counts_sets() {
        let (store, disp) = setup();
        store.seed(RecordSet::Active, applicant_row("p@x.com", "pending"));
        store.seed(RecordSet::Active, applicant_row("d@x.com", "done"));
        store.seed(RecordSet::Archived, applicant_row("o@x.com", "done"));
        let r = disp.handle_command(U, "/stats").await;
        assert!(r.messages[0].contains("Pending: 1"));
        assert!(r.messages[0].contains("Archived: 1"));
        assert!(r.messages[0].contains("Total Active: 2"));
    }

    #[tokio::test]
    async fn menu_callback_starts_flow() {
        let (store, disp) = setup();
        store.seed(RecordSet::Active, applicant_row("a@x.com", "done"));
        let r = disp.handle_callback(U, "menu:mark_payment_pending").await;
        assert!(r.messages[0].contains("pending"));
        disp.handle_text(U, "a@x.com").await;
        assert_eq!(payment_of(&store, "a@x.com"), Some(Value::String("pending".into())));
    }

    #[tokio::test]
    async fn unknown_command_is_reported() {
        let (_, disp) = setup();
        let r = disp.handle_command(U, "/launch").await;
        assert!(r.messages[0].contains("unknown command"));
    }

    #[tokio::test]
    async fn deliver_sends_messages_then_documents_then_keyboard() {
        let messenger = RecordingMessenger::default();
        let reply = Reply {
            messages: vec!["one".into(), "two".into()],
            documents: vec![Document {
                file_name: "cv.pdf".into(),
                bytes: vec![1],
                caption: None,
            }],
            keyboard: Some(command::main_menu()),
        };
        deliver(&messenger, ChatId(5), reply, 4000).await.unwrap();
        let texts: Vec<String> = messenger.sent().into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, vec!["one", "[document] cv.pdf", "two"]);
    }

    #[tokio::test]
    async fn deliver_splits_long_messages() {
        let messenger = RecordingMessenger::default();
        let long = (0..50).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        deliver(&messenger, ChatId(5), Reply::text(long), 60)
            .await
            .unwrap();
        let sent = messenger.sent();
        assert!(sent.len() > 1);
        assert!(sent.iter().all(|(_, t)| t.len() <= 60));
    }

    #[tokio::test]
    async fn deliver_keeps_going_after_a_rejected_chunk() {
        let messenger = RecordingMessenger::default();
        messenger.reject_html_containing("broken");
        let reply = Reply {
            messages: vec!["broken".into(), "fine".into()],
            documents: vec![Document {
                file_name: "cv.pdf".into(),
                bytes: vec![1],
                caption: None,
            }],
            keyboard: None,
        };
        let res = deliver(&messenger, ChatId(5), reply, 4000).await;
        assert!(matches!(res, Err(Error::External(_))));
        let texts: Vec<String> = messenger.sent().into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, vec!["fine", "[document] cv.pdf"]);
    }

    #[tokio::test]
    async fn find_with_a_huge_field_delivers_well_formed_chunks() {
        let (store, disp) = setup();
        let mut row = applicant_row("a@x.com", "done");
        row.insert("achievements".into(), Value::String("R&D! ".repeat(1200)));
        row.insert(
            "cv_url".into(),
            Value::String("https://h/storage/v1/object/public/cv/a-cv.pdf".into()),
        );
        store.seed(RecordSet::Active, row);
        store.put_file(Bucket::Cv, "a-cv.pdf", b"%PDF");

        let reply = disp.handle_command(U, "/find a@x.com").await;
        let messenger = RecordingMessenger::default();
        deliver(&messenger, ChatId(5), reply, 4000).await.unwrap();

        let sent = messenger.sent();
        assert!(sent.iter().any(|(_, t)| t == "[document] cv.pdf"));
        for (_, text) in &sent {
            assert!(text.len() <= 4000);
            let tail = &text[text.rfind('&').unwrap_or(0)..];
            assert!(!text.contains('&') || tail.contains(';'), "cut entity: {tail}");
        }
    }

    #[test]
    fn help_lists_every_command() {
        let text = help_text();
        for (name, _, _) in CATALOG {
            assert!(text.contains(&format!("/{name}")));
        }
    }
}
