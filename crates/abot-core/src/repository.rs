//! Applicant repository: the query/update layer over the storage ports.
//!
//! "Not found" is a normal outcome here and is returned as
//! `Error::NotFound`; callers render it as a reply, not a fault.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use crate::{
    applicant::{
        Applicant, ApplicantSummary, Row, EXPIRATION_COLUMN, KEY_COLUMN, PAYMENT_COLUMN,
        SUMMARY_COLUMNS,
    },
    domain::{Bucket, Lookup, PaymentStatus, RecordSet},
    errors::Error,
    messaging::types::Document,
    ports::{object_name, ApplicantStore, Columns, FileStore, Filter, PlanCount},
    subscription::{self, Outcome},
    transfer, Result,
};

/// A record located by lookup, with the set it was found in.
#[derive(Clone, Debug)]
pub struct Found {
    pub set: RecordSet,
    pub applicant: Applicant,
}

#[derive(Clone, Debug)]
pub struct Extension {
    pub applicant: Applicant,
    pub previous: Option<NaiveDate>,
    pub new_expiration: NaiveDate,
    pub days: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub pending: u64,
    pub done: u64,
    pub archived: u64,
    pub plans: Vec<PlanCount>,
}

impl Stats {
    /// Active applicants (pending + done).
    pub fn total_active(&self) -> u64 {
        self.pending + self.done
    }
}

pub struct ApplicantRepository {
    store: Arc<dyn ApplicantStore>,
    files: Arc<dyn FileStore>,
}

impl ApplicantRepository {
    pub fn new(store: Arc<dyn ApplicantStore>, files: Arc<dyn FileStore>) -> Self {
        Self { store, files }
    }

    pub async fn fetch_by_status(&self, status: PaymentStatus) -> Result<Vec<ApplicantSummary>> {
        let filter = Filter::all().eq(PAYMENT_COLUMN, status.as_str());
        self.summaries(RecordSet::Active, &filter).await
    }

    pub async fn fetch_archived(&self) -> Result<Vec<ApplicantSummary>> {
        self.summaries(RecordSet::Archived, &Filter::all()).await
    }

    /// Look in the active set first, then in the archive.
    pub async fn find(&self, lookup: &Lookup) -> Result<Found> {
        for set in [RecordSet::Active, RecordSet::Archived] {
            if let Some(row) = self.fetch_one(set, lookup).await? {
                return Ok(Found {
                    set,
                    applicant: Applicant::from_row(&row)?,
                });
            }
        }
        Err(Error::NotFound(format!("no applicant matches {lookup}")))
    }

    /// Idempotent: setting the current value issues no write and reports `Unchanged`.
    pub async fn set_payment(
        &self,
        lookup: &Lookup,
        status: PaymentStatus,
    ) -> Result<(Applicant, Outcome)> {
        let current = self.fetch_active(lookup).await?;
        let Some(patch) = subscription::payment_patch(current.payment, status) else {
            return Ok((current, Outcome::Unchanged));
        };
        let updated = self.update_by_key(&current.alias_email, patch).await?;
        tracing::info!(key = %updated.alias_email, payment = status.as_str(), "payment updated");
        Ok((updated, Outcome::Changed))
    }

    /// Overwrites the expiration unconditionally.
    pub async fn set_subscription(&self, lookup: &Lookup, date: NaiveDate) -> Result<Applicant> {
        let current = self.fetch_active(lookup).await?;
        let updated = self
            .update_by_key(&current.alias_email, subscription::expiration_patch(date))
            .await?;
        tracing::info!(key = %updated.alias_email, expiration = %date, "subscription set");
        Ok(updated)
    }

    pub async fn extend_subscription(
        &self,
        lookup: &Lookup,
        days: i64,
        today: NaiveDate,
    ) -> Result<Extension> {
        let current = self.fetch_active(lookup).await?;
        let previous = current.subscription_expiration;
        let new_expiration = subscription::extend(previous, today, days)?;
        let applicant = self
            .update_by_key(
                &current.alias_email,
                subscription::expiration_patch(new_expiration),
            )
            .await?;
        tracing::info!(key = %applicant.alias_email, days, expiration = %new_expiration, "subscription extended");
        Ok(Extension {
            applicant,
            previous,
            new_expiration,
            days,
        })
    }

    pub async fn move_to_archive(&self, lookup: &Lookup) -> Result<Applicant> {
        let row = transfer::transfer(self.store.as_ref(), lookup, RecordSet::Active).await?;
        Applicant::from_row(&row)
    }

    pub async fn move_to_active(&self, lookup: &Lookup) -> Result<Applicant> {
        let row = transfer::transfer(self.store.as_ref(), lookup, RecordSet::Archived).await?;
        Applicant::from_row(&row)
    }

    pub async fn count_by_status(&self, status: PaymentStatus) -> Result<u64> {
        let filter = Filter::all().eq(PAYMENT_COLUMN, status.as_str());
        self.store.count(RecordSet::Active, &filter).await
    }

    pub async fn stats(&self) -> Result<Stats> {
        let pending = self.count_by_status(PaymentStatus::Pending).await?;
        let done = self.count_by_status(PaymentStatus::Done).await?;
        let archived = self.store.count(RecordSet::Archived, &Filter::all()).await?;
        let plans = match self.store.plan_counts().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "plan breakdown unavailable");
                Vec::new()
            }
        };
        Ok(Stats {
            pending,
            done,
            archived,
            plans,
        })
    }

    /// Active applicants whose subscription ended before `today`.
    pub async fn expired(&self, today: NaiveDate) -> Result<Vec<ApplicantSummary>> {
        let filter = Filter::all().lt(EXPIRATION_COLUMN, subscription::format_date(today));
        self.summaries(RecordSet::Active, &filter).await
    }

    /// Active applicants whose subscription ends within `window_days` (inclusive).
    pub async fn expiring(
        &self,
        today: NaiveDate,
        window_days: i64,
    ) -> Result<Vec<ApplicantSummary>> {
        let until = today
            .checked_add_signed(Duration::days(window_days))
            .unwrap_or(today);
        let filter = Filter::all()
            .gte(EXPIRATION_COLUMN, subscription::format_date(today))
            .lte(EXPIRATION_COLUMN, subscription::format_date(until));
        self.summaries(RecordSet::Active, &filter).await
    }

    /// Download the stored files of an applicant. Missing or failing files are skipped.
    pub async fn attachments(&self, applicant: &Applicant) -> Vec<Document> {
        let mut out = Vec::new();
        for bucket in [Bucket::Cv, Bucket::Letters, Bucket::Pictures] {
            let Some(name) = applicant.file_url(bucket).and_then(object_name) else {
                continue;
            };
            match self.files.download(bucket, name).await {
                Ok(bytes) => out.push(Document {
                    file_name: name.to_string(),
                    bytes,
                    caption: Some(bucket.caption().to_string()),
                }),
                Err(e) => {
                    tracing::warn!(key = %applicant.alias_email, object = name, error = %e, "file download failed");
                }
            }
        }
        out
    }

    async fn summaries(&self, set: RecordSet, filter: &Filter) -> Result<Vec<ApplicantSummary>> {
        let rows = self
            .store
            .select(set, filter, Columns::Only(SUMMARY_COLUMNS))
            .await?;
        Ok(rows.iter().map(ApplicantSummary::from_row).collect())
    }

    async fn fetch_one(&self, set: RecordSet, lookup: &Lookup) -> Result<Option<Row>> {
        let mut rows = self
            .store
            .select(set, &Filter::by(lookup), Columns::All)
            .await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(rows.remove(0))),
            n => Err(Error::InvalidArgument(format!(
                "{n} applicants match {lookup}; use the alias email"
            ))),
        }
    }

    async fn fetch_active(&self, lookup: &Lookup) -> Result<Applicant> {
        match self.fetch_one(RecordSet::Active, lookup).await? {
            Some(row) => Applicant::from_row(&row),
            None => Err(Error::NotFound(format!("no active applicant matches {lookup}"))),
        }
    }

    async fn update_by_key(&self, key: &str, patch: Row) -> Result<Applicant> {
        let filter = Filter::all().eq(KEY_COLUMN, key);
        let mut rows = self.store.update(RecordSet::Active, &filter, patch).await?;
        if rows.is_empty() {
            return Err(Error::NotFound(format!("no active applicant matches {key}")));
        }
        Applicant::from_row(&rows.remove(0))
    }
}
