//! Rendering records and reports as Telegram HTML.

use chrono::NaiveDate;

use crate::{
    applicant::{Applicant, ApplicantSummary},
    domain::RecordSet,
    repository::Stats,
    subscription::days_left,
};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Accumulates the non-empty lines of one titled section.
struct Section {
    title: &'static str,
    lines: Vec<String>,
}

impl Section {
    fn new(title: &'static str) -> Self {
        Self {
            title,
            lines: Vec::new(),
        }
    }

    fn field(&mut self, label: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            self.lines.push(format!("{label}: {}", escape_html(v)));
        }
        self
    }

    fn code(&mut self, label: &str, value: &str) -> &mut Self {
        self.lines
            .push(format!("{label}: <code>{}</code>", escape_html(value)));
        self
    }

    fn list(&mut self, label: &str, values: &[String]) -> &mut Self {
        if !values.is_empty() {
            self.field(label, Some(values.join(", ").as_str()));
        }
        self
    }

    fn raw(&mut self, line: String) -> &mut Self {
        self.lines.push(line);
        self
    }

    fn render(&self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        Some(format!(
            "<b>{}</b>\n\n{}",
            escape_html(self.title),
            self.lines.join("\n")
        ))
    }
}

fn opt(s: &Option<String>) -> Option<&str> {
    s.as_deref()
}

fn span(start: &Option<String>, end: &Option<String>, current: bool) -> Option<String> {
    let end = if current {
        Some("Present".to_string())
    } else {
        end.clone()
    };
    match (start, end) {
        (None, None) => None,
        (s, e) => Some(format!(
            "🗓️ {} → {}",
            escape_html(s.as_deref().unwrap_or("-")),
            escape_html(e.as_deref().unwrap_or("-"))
        )),
    }
}

/// Subscription status relative to `today`.
pub fn subscription_status(expiration: NaiveDate, today: NaiveDate) -> String {
    let left = days_left(expiration, today);
    match left {
        l if l < 0 => format!("{expiration} (expired {} days ago)", -l),
        0 => format!("{expiration} (expires today)"),
        1 => format!("{expiration} (1 day left)"),
        l => format!("{expiration} ({l} days left)"),
    }
}

/// Full record, one HTML message per non-empty section.
pub fn applicant_sections(a: &Applicant, set: RecordSet, today: NaiveDate) -> Vec<String> {
    let mut sections = Vec::new();

    let mut overview = Section::new("🚨 APPLICANT DETAILS");
    let name = a.full_name();
    overview
        .field("👤 Name", (name != "-").then_some(name.as_str()))
        .field("✒️ Plan", opt(&a.plan))
        .code("📧 Alias", &a.alias_email)
        .field("📧 Personal email", opt(&a.email))
        .field("📂 Record", Some(set.label()))
        .field("💳 Payment", a.payment.map(|p| p.as_str()));
    if let Some(exp) = a.subscription_expiration {
        overview.field(
            "📅 Subscription",
            Some(subscription_status(exp, today).as_str()),
        );
    }
    sections.push(overview);

    let mut prefs = Section::new("🔎 Search Preferences");
    prefs
        .field("Applying for", opt(&a.apply_role))
        .field("Search AI Accuracy", opt(&a.search_accuracy))
        .field("Employment Type", opt(&a.employment_type))
        .list("Country Preference", &a.country_preference);
    sections.push(prefs);

    let mut contact = Section::new("📞 Contact Information");
    contact
        .field("WhatsApp", opt(&a.whatsapp))
        .field("LinkedIn", opt(&a.linkedin))
        .field("X/Twitter", opt(&a.twitter))
        .field("GitHub", opt(&a.github))
        .field("Portfolio", opt(&a.website));
    sections.push(contact);

    let mut address = Section::new("🏠 Address Information");
    address
        .field("Street", opt(&a.street))
        .field("Building No", opt(&a.building))
        .field("Apartment No", opt(&a.apartment))
        .field("City", opt(&a.city))
        .field("Country", opt(&a.country))
        .field("Zip Code", opt(&a.zip));
    sections.push(address);

    let mut legal = Section::new("📝 Legalisation");
    legal
        .list("Authorized Countries", &a.authorized_countries)
        .field("Visa", opt(&a.visa))
        .field("Willing to relocate", opt(&a.relocate))
        .field(
            "Total years of experience",
            a.experience_years.as_ref().map(|y| format!("{y} years")).as_deref(),
        );
    sections.push(legal);

    let mut roles = Section::new("🎯 Experience");
    for r in &a.roles {
        let mut entry = vec![format!(
            "• <b>{}</b>{}",
            escape_html(r.title.as_deref().unwrap_or("-")),
            r.company
                .as_deref()
                .map(|c| format!(" at {}", escape_html(c)))
                .unwrap_or_default()
        )];
        if let Some(loc) = &r.location {
            entry.push(format!("  📍 {}", escape_html(loc)));
        }
        if let Some(s) = span(&r.start, &r.end, r.current) {
            entry.push(format!("  {s}"));
        }
        if let Some(desc) = &r.description {
            entry.push(format!("  📝 {}", escape_html(desc)));
        }
        roles.raw(entry.join("\n"));
    }
    sections.push(roles);

    let mut education = Section::new("🎓 Education");
    for e in &a.education {
        let mut entry = vec![format!(
            "• <b>{}</b>{}",
            escape_html(e.degree.as_deref().unwrap_or("-")),
            e.field
                .as_deref()
                .map(|f| format!(", {}", escape_html(f)))
                .unwrap_or_default()
        )];
        if let Some(school) = &e.school {
            entry.push(format!("  🏫 {}", escape_html(school)));
        }
        if let Some(s) = span(&e.start, &e.end, false) {
            entry.push(format!("  {s}"));
        }
        education.raw(entry.join("\n"));
    }
    sections.push(education);

    let mut certificates = Section::new("📜 Courses & Certificates");
    for c in &a.certificates {
        let mut entry = vec![format!(
            "• <b>{}</b>",
            escape_html(c.name.as_deref().unwrap_or("-"))
        )];
        if let Some(n) = &c.number {
            entry.push(format!("  🆔 {}", escape_html(n)));
        }
        if let Some(s) = span(&c.start, &c.end, false) {
            entry.push(format!("  {s}"));
        }
        certificates.raw(entry.join("\n"));
    }
    sections.push(certificates);

    let mut languages = Section::new("🌍 Languages");
    for l in &a.languages {
        languages.raw(format!(
            "• <b>{}</b>{}",
            escape_html(l.language.as_deref().unwrap_or("-")),
            l.proficiency
                .as_deref()
                .map(|p| format!(": {}", escape_html(p)))
                .unwrap_or_default()
        ));
    }
    sections.push(languages);

    let mut skills = Section::new("🛠 Skills");
    if !a.skills.is_empty() {
        skills.raw(escape_html(&a.skills.join(", ")));
    }
    sections.push(skills);

    let salary = |amount: &Option<String>| {
        amount.as_ref().map(|v| match &a.salary_currency {
            Some(cur) => format!("{cur} {v}"),
            None => v.clone(),
        })
    };
    let mut compensation = Section::new("💰 Compensation Details");
    compensation
        .field("Expected Salary", salary(&a.expected_salary).as_deref())
        .field("Current Salary", salary(&a.current_salary).as_deref());
    sections.push(compensation);

    let mut achievements = Section::new("🏆 Achievements");
    if let Some(text) = &a.achievements {
        achievements.raw(escape_html(text));
    }
    sections.push(achievements);

    sections.iter().filter_map(Section::render).collect()
}

fn summary_block(s: &ApplicantSummary, extra: Option<String>) -> String {
    let mut out = format!(
        "• {}\n  📧 <code>{}</code>\n  📱 {}",
        escape_html(&s.full_name()),
        escape_html(&s.alias_email),
        escape_html(s.whatsapp.as_deref().unwrap_or("N/A"))
    );
    if let Some(extra) = extra {
        out.push_str("\n  ");
        out.push_str(&extra);
    }
    out
}

/// Titled list of applicants, or `empty` when there are none.
pub fn applicant_list(title: &str, empty: &str, items: &[ApplicantSummary]) -> String {
    if items.is_empty() {
        return format!("<b>{title}</b>\n\n{empty}");
    }
    let body = items
        .iter()
        .map(|s| summary_block(s, None))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("<b>{title}</b> ({})\n\n{body}", items.len())
}

/// List of applicants with their subscription state relative to `today`.
pub fn subscription_list(
    title: &str,
    empty: &str,
    items: &[ApplicantSummary],
    today: NaiveDate,
) -> String {
    if items.is_empty() {
        return format!("<b>{title}</b>\n\n{empty}");
    }
    let body = items
        .iter()
        .map(|s| {
            let extra = s
                .subscription_expiration
                .map(|exp| format!("📅 {}", subscription_status(exp, today)));
            summary_block(s, extra)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("<b>{title}</b> ({})\n\n{body}", items.len())
}

pub fn stats(s: &Stats) -> String {
    let plans = if s.plans.is_empty() {
        "No plans found".to_string()
    } else {
        s.plans
            .iter()
            .map(|p| format!("• {}: {}", escape_html(&p.plan), p.count))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "📊 <b>Statistics</b>\n\n\
         ⏳ Pending: {}\n\
         ✅ Done: {}\n\
         📦 Archived: {}\n\n\
         ✒️ <b>Applicants per Plan</b>\n\n\
         {plans}\n\n\
         📈 Total Active: {}",
        s.pending,
        s.done,
        s.archived,
        s.total_active()
    )
}

/// Daily report for the admin chat.
pub fn daily_report(
    today: NaiveDate,
    window_days: i64,
    expired: &[ApplicantSummary],
    expiring: &[ApplicantSummary],
) -> String {
    let mut out = format!("📅 <b>DAILY SUBSCRIPTION REPORT</b>\nDate: {today}\n");

    if expired.is_empty() {
        out.push_str("\n✅ No expired subscriptions\n");
    } else {
        out.push_str(&format!("\n❌ <b>EXPIRED ({})</b>\n\n", expired.len()));
        out.push_str(&subscription_lines(expired, today));
    }

    if expiring.is_empty() {
        out.push_str("\n✅ No subscriptions expiring soon\n");
    } else {
        out.push_str(&format!(
            "\n⏳ <b>EXPIRING WITHIN {window_days} DAYS ({})</b>\n\n",
            expiring.len()
        ));
        out.push_str(&subscription_lines(expiring, today));
    }
    out
}

fn subscription_lines(items: &[ApplicantSummary], today: NaiveDate) -> String {
    let mut out = String::new();
    for s in items {
        let extra = s
            .subscription_expiration
            .map(|exp| format!("⏰ {}", subscription_status(exp, today)));
        out.push_str(&summary_block(s, extra));
        out.push('\n');
    }
    out
}

/// Split `text` into pieces of at most `limit` bytes, preferring line breaks.
///
/// Lines longer than `limit` are cut outside `&...;` entities and `<...>`
/// tags; tags still open at a cut are closed and reopened in the next piece.
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();
    let mut current = String::new();
    for line in text.split('\n') {
        let needed = if current.is_empty() {
            line.len()
        } else {
            current.len() + 1 + line.len()
        };
        if needed <= limit {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            continue;
        }

        if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }

        let reserve = CLOSING_RESERVE.min(limit / 4);
        let mut reopen = String::new();
        let mut rest = line;
        while reopen.len() + rest.len() > limit {
            let budget = limit.saturating_sub(reopen.len() + reserve).max(1);
            let cut = safe_cut(rest, budget);
            let mut piece = format!("{reopen}{}", &rest[..cut]);
            let open = open_tags(&piece);
            for (name, _) in open.iter().rev() {
                piece.push_str(&format!("</{name}>"));
            }
            reopen = open.into_iter().map(|(_, tag)| tag).collect();
            out.push(piece);
            rest = &rest[cut..];
        }
        current = format!("{reopen}{rest}");
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Room kept at the end of a cut piece for closing tags.
const CLOSING_RESERVE: usize = 32;

/// Largest cut `<= budget` on a char boundary that does not split an entity
/// or a tag. Always advances by at least one char.
fn safe_cut(s: &str, budget: usize) -> usize {
    let mut cut = budget.min(s.len());
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = &s[..cut];
    let open_entity = head.rfind('&').filter(|&i| !head[i..].contains(';'));
    let open_tag = head.rfind('<').filter(|&i| !head[i..].contains('>'));
    if let Some(i) = open_entity.into_iter().chain(open_tag).min() {
        if i > 0 {
            cut = i;
        }
    }
    if cut == 0 {
        cut = s.chars().next().map_or(s.len(), char::len_utf8);
    }
    cut
}

/// Tags left open in `html`, outermost first, as `(name, opening tag)`.
fn open_tags(html: &str) -> Vec<(String, String)> {
    let mut stack: Vec<(String, String)> = Vec::new();
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        let tag = &rest[start..=start + len];
        let inner = &tag[1..tag.len() - 1];
        if let Some(closing) = inner.strip_prefix('/') {
            let name = closing.trim();
            if let Some(pos) = stack.iter().rposition(|(n, _)| n == name) {
                stack.truncate(pos);
            }
        } else if !inner.ends_with('/') {
            let name = inner.split_whitespace().next().unwrap_or("").to_string();
            if !name.is_empty() {
                stack.push((name, tag.to_string()));
            }
        }
        rest = &rest[start + len + 1..];
    }
    stack
}
