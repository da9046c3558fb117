//! Chat commands.
//!
//! Commands form a closed enum; parsing is the only place that deals with
//! command strings, so adding a command means adding a variant and handling
//! it in the dispatcher's exhaustive match.

use chrono::NaiveDate;

use crate::{
    domain::Lookup,
    errors::Error,
    messaging::types::InlineKeyboard,
    session::{Action, Flow},
    subscription::{parse_extension_days, parse_subscription_date},
    Result,
};

/// Callback-data prefix used by the inline main menu.
pub const MENU_PREFIX: &str = "menu:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Cancel,
    ListPending,
    ListDone,
    ListArchived,
    Find(Lookup),
    MarkPaymentDone(Lookup),
    MarkPaymentPending(Lookup),
    SetSubscription { lookup: Lookup, date: NaiveDate },
    ExtendSubscription { lookup: Lookup, days: i64 },
    Archive(Lookup),
    Restore(Lookup),
    Stats,
    Expired,
    ExpiringSoon,
}

/// Result of reading user input: a runnable command, or a flow that still
/// needs more input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Parsed {
    Ready(Command),
    Incomplete(Flow),
}

/// Command names with their argument hint and description, for `/help` and
/// the Telegram command list.
pub const CATALOG: &[(&str, &str, &str)] = &[
    ("start", "", "open the main menu"),
    ("list_pending", "", "applicants with pending payment"),
    ("list_done", "", "applicants with completed payment"),
    ("list_archived", "", "archived applicants"),
    ("find", "<alias|phone>", "show an applicant with files"),
    ("mark_payment_done", "<alias|phone>", "set payment to done"),
    ("mark_payment_pending", "<alias|phone>", "set payment to pending"),
    ("set_subscription", "<alias|phone> <YYYY-MM-DD>", "set the expiration date"),
    ("extend_subscription", "<alias|phone> <days>", "extend the expiration"),
    ("archive", "<alias|phone>", "move an applicant to the archive"),
    ("restore", "<alias|phone>", "move an applicant back to active"),
    ("expired", "", "subscriptions that have lapsed"),
    ("expiring", "", "subscriptions ending soon"),
    ("stats", "", "counts per status and plan"),
    ("cancel", "", "abort the current step-by-step action"),
    ("help", "", "list commands"),
];

/// Split `/cmd@botname args...` into a normalized name and the raw argument text.
pub fn split_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let name = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase()
        .replace('-', "_");

    (name, rest)
}

/// Parse a `/command args` message.
pub fn parse(text: &str) -> Result<Parsed> {
    let (name, args) = split_command(text);
    parse_named(&name, &args)
}

/// Parse inline-menu callback data (`menu:<command>`).
pub fn parse_callback(data: &str) -> Result<Parsed> {
    let name = data
        .strip_prefix(MENU_PREFIX)
        .ok_or_else(|| Error::InvalidArgument(format!("unknown button '{data}'")))?;
    parse_named(name, "")
}

fn parse_named(name: &str, args: &str) -> Result<Parsed> {
    let simple = |cmd: Command| -> Result<Parsed> {
        if args.is_empty() {
            Ok(Parsed::Ready(cmd))
        } else {
            Err(Error::InvalidArgument(format!("/{name} takes no arguments")))
        }
    };

    match name {
        "start" | "menu" => simple(Command::Start),
        "help" => simple(Command::Help),
        "cancel" => simple(Command::Cancel),
        "list_pending" | "pending" => simple(Command::ListPending),
        "list_done" | "done" => simple(Command::ListDone),
        "list_archived" | "archived" => simple(Command::ListArchived),
        "stats" => simple(Command::Stats),
        "expired" => simple(Command::Expired),
        "expiring" | "expiring_soon" => simple(Command::ExpiringSoon),
        "find" | "find_by_alias" => with_args(Action::Find, args),
        "mark_payment_done" | "paid" => with_args(Action::MarkPaymentDone, args),
        "mark_payment_pending" | "unpaid" => with_args(Action::MarkPaymentPending, args),
        "set_subscription" => with_args(Action::SetSubscription, args),
        "extend_subscription" | "extend" => with_args(Action::ExtendSubscription, args),
        "archive" => with_args(Action::Archive, args),
        "restore" => with_args(Action::Restore, args),
        "" => Err(Error::InvalidArgument("empty command".to_string())),
        other => Err(Error::InvalidArgument(format!(
            "unknown command /{other}; send /help for the list"
        ))),
    }
}

/// Commands taking an applicant; missing arguments start a flow.
fn with_args(action: Action, args: &str) -> Result<Parsed> {
    let start = Flow::AwaitingLookup(action);
    if args.is_empty() {
        return Ok(Parsed::Incomplete(start));
    }

    if !matches!(action, Action::SetSubscription | Action::ExtendSubscription) {
        return advance(&start, args);
    }

    // The lookup may contain spaces (phone numbers); the value is the last token.
    let (lookup_text, value) = match args.rsplit_once(char::is_whitespace) {
        Some((lookup, value)) => (lookup.trim(), Some(value)),
        None => (args, None),
    };
    match (advance(&start, lookup_text)?, value) {
        (Parsed::Incomplete(flow), Some(value)) => advance(&flow, value),
        (parsed, _) => Ok(parsed),
    }
}

/// Feed one line of user input into a pending flow.
pub fn advance(flow: &Flow, input: &str) -> Result<Parsed> {
    let cmd = match flow {
        Flow::AwaitingLookup(action) => {
            let lookup = Lookup::parse(input)?;
            match action {
                Action::Find => Command::Find(lookup),
                Action::MarkPaymentDone => Command::MarkPaymentDone(lookup),
                Action::MarkPaymentPending => Command::MarkPaymentPending(lookup),
                Action::Archive => Command::Archive(lookup),
                Action::Restore => Command::Restore(lookup),
                Action::SetSubscription => {
                    return Ok(Parsed::Incomplete(Flow::AwaitingDate { lookup }))
                }
                Action::ExtendSubscription => {
                    return Ok(Parsed::Incomplete(Flow::AwaitingDays { lookup }))
                }
            }
        }
        Flow::AwaitingDate { lookup } => Command::SetSubscription {
            lookup: lookup.clone(),
            date: parse_subscription_date(input)?,
        },
        Flow::AwaitingDays { lookup } => Command::ExtendSubscription {
            lookup: lookup.clone(),
            days: parse_extension_days(input)?,
        },
    };
    Ok(Parsed::Ready(cmd))
}

pub fn main_menu() -> InlineKeyboard {
    InlineKeyboard::from_pairs(&[
        ("⏳ Pending Applicants", "menu:list_pending"),
        ("✅ Done Applicants", "menu:list_done"),
        ("📦 Archived Applicants", "menu:list_archived"),
        ("🔍 Find Applicant", "menu:find"),
        ("💰 Mark Payment Done", "menu:mark_payment_done"),
        ("⏳ Mark Payment Pending", "menu:mark_payment_pending"),
        ("📅 Set Subscription Date", "menu:set_subscription"),
        ("➕ Extend Subscription", "menu:extend_subscription"),
        ("❌ Expired Subscriptions", "menu:expired"),
        ("⏳ Expiring Soon", "menu:expiring"),
        ("🗄️ Archive Applicant", "menu:archive"),
        ("♻️ Restore Applicant", "menu:restore"),
        ("📊 Statistics", "menu:stats"),
    ])
}
