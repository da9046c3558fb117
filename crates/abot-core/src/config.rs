use std::{collections::HashMap, env, fs, path::Path, time::Duration};

use crate::{errors::Error, Result};

/// Typed configuration for the bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_allowed_users: Vec<i64>,
    pub alert_chat_id: Option<i64>,
    pub telegram_safe_limit: usize,

    // Hosted backend
    pub supabase_url: String,
    pub supabase_key: String,
    pub http_timeout: Duration,
    pub active_table: String,
    pub archive_table: String,
    pub plan_stats_rpc: String,
    pub pictures_bucket: String,
    pub cv_bucket: String,
    pub letters_bucket: String,

    // Subscription report
    pub alerts_enabled: bool,
    pub alert_hour: u32,
    pub expiring_window_days: i64,

    // Multi-step flows
    pub flow_timeout: Duration,
}

impl Config {
    /// Load from `.env` (if present) and the process environment.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| map.get(key).cloned())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| get(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN")
            .or_else(|| get("TELEGRAM_TOKEN"))
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;

        let alert_chat_id = get("TELEGRAM_CHAT_ID").and_then(|s| s.trim().parse::<i64>().ok());

        let mut telegram_allowed_users = parse_csv_i64(get("TELEGRAM_ALLOWED_USERS"));
        if telegram_allowed_users.is_empty() {
            // A private admin chat id equals the admin's user id.
            if let Some(id) = alert_chat_id.filter(|id| *id > 0) {
                telegram_allowed_users.push(id);
            }
        }
        if telegram_allowed_users.is_empty() {
            return Err(Error::Config(
                "TELEGRAM_ALLOWED_USERS environment variable is required".to_string(),
            ));
        }

        let supabase_url = get("SUPABASE_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .ok_or_else(|| {
                Error::Config("SUPABASE_URL environment variable is required".to_string())
            })?;
        if !supabase_url.starts_with("http://") && !supabase_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "SUPABASE_URL must be an http(s) URL, got {supabase_url}"
            )));
        }
        let supabase_key = get("SUPABASE_KEY").ok_or_else(|| {
            Error::Config("SUPABASE_KEY environment variable is required".to_string())
        })?;

        let http_timeout = Duration::from_secs(parse_u64(get("HTTP_TIMEOUT_SECS")).unwrap_or(30));
        let telegram_safe_limit = parse_u64(get("TELEGRAM_SAFE_LIMIT"))
            .map(|v| v as usize)
            .unwrap_or(4000)
            .clamp(200, 4096);

        let alerts_enabled = get("ALERTS_ENABLED").map(|s| parse_bool(&s)).unwrap_or(true);
        let alert_hour = parse_u64(get("ALERT_HOUR")).unwrap_or(7).min(23) as u32;
        let expiring_window_days = parse_u64(get("EXPIRING_WINDOW_DAYS"))
            .unwrap_or(7)
            .min(365) as i64;
        let flow_timeout =
            Duration::from_secs(parse_u64(get("FLOW_TIMEOUT_SECS")).unwrap_or(600).max(1));

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            alert_chat_id,
            telegram_safe_limit,
            supabase_url,
            supabase_key,
            http_timeout,
            active_table: get("ACTIVE_TABLE").unwrap_or_else(|| "applications".to_string()),
            archive_table: get("ARCHIVE_TABLE")
                .unwrap_or_else(|| "applications_archive".to_string()),
            plan_stats_rpc: get("PLAN_STATS_RPC")
                .unwrap_or_else(|| "get_applications_per_plan".to_string()),
            pictures_bucket: get("PICTURES_BUCKET").unwrap_or_else(|| "pictures".to_string()),
            cv_bucket: get("CV_BUCKET").unwrap_or_else(|| "cv".to_string()),
            letters_bucket: get("LETTERS_BUCKET").unwrap_or_else(|| "letters".to_string()),
            alerts_enabled,
            alert_hour,
            expiring_window_days,
            flow_timeout,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    let quoted = val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')));
    if quoted {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
