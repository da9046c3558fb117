//! Daily subscription report.
//!
//! A background task sleeps until the configured hour (local time), sends
//! the expired / expiring report to the admin chat, and repeats.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::ChatId, formatting, messaging::port::MessagingPort,
    repository::ApplicantRepository, Result,
};

#[derive(Clone)]
pub struct SubscriptionAlerts {
    inner: Arc<AlertsInner>,
}

struct AlertsInner {
    repo: Arc<ApplicantRepository>,
    messenger: Arc<dyn MessagingPort>,
    chat_id: ChatId,
    hour: u32,
    window_days: i64,
    message_limit: usize,
}

impl SubscriptionAlerts {
    pub fn new(
        repo: Arc<ApplicantRepository>,
        messenger: Arc<dyn MessagingPort>,
        chat_id: ChatId,
        hour: u32,
        window_days: i64,
        message_limit: usize,
    ) -> Self {
        Self {
            inner: Arc::new(AlertsInner {
                repo,
                messenger,
                chat_id,
                hour: hour.min(23),
                window_days,
                message_limit,
            }),
        }
    }

    /// Build and send the report for `today`.
    pub async fn send_report(&self, today: NaiveDate) -> Result<()> {
        let inner = &self.inner;
        let expired = inner.repo.expired(today).await?;
        let expiring = inner.repo.expiring(today, inner.window_days).await?;
        let text = formatting::daily_report(today, inner.window_days, &expired, &expiring);
        for chunk in formatting::chunk_message(&text, inner.message_limit) {
            inner.messenger.send_html(inner.chat_id, &chunk).await?;
        }
        tracing::info!(
            expired = expired.len(),
            expiring = expiring.len(),
            "daily subscription report sent"
        );
        Ok(())
    }

    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let alerts = self.clone();
        tracing::info!(hour = alerts.inner.hour, "daily subscription report scheduled");
        tokio::spawn(async move { alerts.run(cancel).await })
    }

    async fn run(&self, cancel: CancellationToken) {
        loop {
            let now = Local::now().naive_local();
            let next = next_run_after(now, self.inner.hour);
            let dur = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(dur) => {
                    if let Err(e) = self.send_report(next.date()).await {
                        tracing::error!(error = %e, "daily subscription report failed");
                    }
                }
            }
        }
        tracing::debug!("daily subscription report stopped");
    }
}

/// The next `hour:00` strictly after `now`.
pub fn next_run_after(now: NaiveDateTime, hour: u32) -> NaiveDateTime {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let candidate = now.date().and_time(at);
    if candidate > now {
        candidate
    } else {
        candidate + ChronoDuration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::RecordSet,
        testing::{applicant_row, MemoryStore, RecordingMessenger},
    };
    use serde_json::Value;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn next_run_is_today_before_the_hour() {
        assert_eq!(next_run_after(dt(2026, 3, 1, 6, 59), 7), dt(2026, 3, 1, 7, 0));
    }

    #[test]
    fn next_run_is_tomorrow_at_or_after_the_hour() {
        assert_eq!(next_run_after(dt(2026, 3, 1, 7, 0), 7), dt(2026, 3, 2, 7, 0));
        assert_eq!(next_run_after(dt(2026, 12, 31, 23, 0), 7), dt(2027, 1, 1, 7, 0));
    }

    #[tokio::test]
    async fn report_lists_expired_and_expiring() {
        let store = Arc::new(MemoryStore::default());
        for (alias, exp) in [
            ("old@x.com", "2026-02-20"),
            ("soon@x.com", "2026-03-05"),
            ("later@x.com", "2026-06-01"),
        ] {
            let mut row = applicant_row(alias, "done");
            row.insert("subscription_expiration".into(), Value::String(exp.into()));
            store.seed(RecordSet::Active, row);
        }
        let repo = Arc::new(ApplicantRepository::new(store.clone(), store.clone()));
        let messenger = Arc::new(RecordingMessenger::default());
        let alerts = SubscriptionAlerts::new(repo, messenger.clone(), ChatId(-100), 7, 7, 4000);

        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        alerts.send_report(today).await.unwrap();

        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ChatId(-100));
        assert!(sent[0].1.contains("old@x.com"));
        assert!(sent[0].1.contains("soon@x.com"));
        assert!(!sent[0].1.contains("later@x.com"));
    }

    #[tokio::test]
    async fn backend_failure_sends_nothing() {
        let store = Arc::new(MemoryStore::default());
        store.set_offline(true);
        let repo = Arc::new(ApplicantRepository::new(store.clone(), store.clone()));
        let messenger = Arc::new(RecordingMessenger::default());
        let alerts = SubscriptionAlerts::new(repo, messenger.clone(), ChatId(1), 7, 7, 4000);
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(alerts.send_report(today).await.is_err());
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn start_stops_on_cancel() {
        let store = Arc::new(MemoryStore::default());
        let repo = Arc::new(ApplicantRepository::new(store.clone(), store));
        let alerts = SubscriptionAlerts::new(
            repo,
            Arc::new(RecordingMessenger::default()),
            ChatId(1),
            7,
            7,
            4000,
        );
        let cancel = CancellationToken::new();
        let handle = alerts.start(cancel.clone());
        cancel.cancel();
        handle.await.unwrap();
    }
}
