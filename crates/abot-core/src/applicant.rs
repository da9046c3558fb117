//! Applicant records.
//!
//! Rows are kept as raw JSON objects while they move through the store so that
//! no column is lost or retyped; `Applicant` is a lenient, display-oriented
//! decoding of such a row.

use chrono::NaiveDate;
use serde_json::Value;

use crate::{
    domain::{Bucket, PaymentStatus},
    errors::Error,
    Result,
};

/// One record as stored by the backend.
pub type Row = serde_json::Map<String, Value>;

pub const KEY_COLUMN: &str = "alias_email";
pub const PAYMENT_COLUMN: &str = "payment";
pub const EXPIRATION_COLUMN: &str = "subscription_expiration";
pub const PLAN_COLUMN: &str = "application_plan";

/// Columns fetched for list views.
pub const SUMMARY_COLUMNS: &[&str] = &[
    "alias_email",
    "first_name",
    "last_name",
    "whatsapp",
    "subscription_expiration",
];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Role {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub current: bool,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Education {
    pub degree: Option<String>,
    pub field: Option<String>,
    pub school: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Certificate {
    pub name: Option<String>,
    pub number: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Language {
    pub language: Option<String>,
    pub proficiency: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Applicant {
    pub alias_email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub plan: Option<String>,
    pub payment: Option<PaymentStatus>,
    pub subscription_expiration: Option<NaiveDate>,

    // Search preferences
    pub apply_role: Option<String>,
    pub search_accuracy: Option<String>,
    pub employment_type: Option<String>,
    pub country_preference: Vec<String>,

    // Contact
    pub linkedin: Option<String>,
    pub twitter: Option<String>,
    pub github: Option<String>,
    pub website: Option<String>,

    // Address
    pub street: Option<String>,
    pub building: Option<String>,
    pub apartment: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,

    // Legalisation
    pub authorized_countries: Vec<String>,
    pub visa: Option<String>,
    pub relocate: Option<String>,
    pub experience_years: Option<String>,

    pub roles: Vec<Role>,
    pub education: Vec<Education>,
    pub certificates: Vec<Certificate>,
    pub languages: Vec<Language>,
    pub skills: Vec<String>,

    // Compensation
    pub expected_salary: Option<String>,
    pub current_salary: Option<String>,
    pub salary_currency: Option<String>,

    pub achievements: Option<String>,

    pub picture_url: Option<String>,
    pub cv_url: Option<String>,
    pub recommendation_url: Option<String>,
}

impl Applicant {
    pub fn from_row(row: &Row) -> Result<Self> {
        let alias_email = text(row, KEY_COLUMN)
            .ok_or_else(|| Error::Backend("record without alias_email".to_string()))?;

        Ok(Self {
            alias_email,
            first_name: text(row, "first_name"),
            last_name: text(row, "last_name"),
            email: text(row, "email"),
            whatsapp: text(row, "whatsapp"),
            plan: text(row, PLAN_COLUMN),
            payment: text(row, PAYMENT_COLUMN).and_then(|s| PaymentStatus::parse(&s)),
            subscription_expiration: date(row, EXPIRATION_COLUMN),
            apply_role: text(row, "apply_role"),
            search_accuracy: text(row, "search_accuracy"),
            employment_type: text(row, "employment_type"),
            country_preference: list(row, "country_preference"),
            linkedin: text(row, "linkedin"),
            twitter: text(row, "twitter"),
            github: text(row, "github"),
            website: text(row, "website"),
            street: text(row, "street"),
            building: text(row, "building"),
            apartment: text(row, "apartment"),
            city: text(row, "city"),
            country: text(row, "country"),
            zip: text(row, "zip"),
            // Both spellings exist in deployed schemas.
            authorized_countries: first_non_empty(
                list(row, "authorized_countries"),
                list(row, "autorized_countries"),
            ),
            visa: text(row, "visa"),
            relocate: text(row, "relocate"),
            experience_years: text(row, "experience"),
            roles: objects(row, "roles")
                .map(|o| Role {
                    title: text(o, "title"),
                    company: text(o, "company"),
                    location: text(o, "location"),
                    start: text(o, "start"),
                    end: text(o, "end"),
                    current: flag(o, "current"),
                    description: text(o, "description"),
                })
                .collect(),
            education: objects(row, "education")
                .map(|o| Education {
                    degree: text(o, "degree"),
                    field: text(o, "field"),
                    school: text(o, "school"),
                    start: text(o, "start"),
                    end: text(o, "end"),
                })
                .collect(),
            certificates: objects(row, "certificates")
                .map(|o| Certificate {
                    name: text(o, "name"),
                    number: text(o, "number"),
                    start: text(o, "start"),
                    end: text(o, "end"),
                })
                .collect(),
            languages: objects(row, "languages")
                .map(|o| Language {
                    language: text(o, "language"),
                    proficiency: text(o, "proficiency"),
                })
                .collect(),
            skills: list(row, "skills"),
            expected_salary: text(row, "expected_salary"),
            current_salary: text(row, "current_salary"),
            salary_currency: text(row, "expected_salary_currency"),
            achievements: text(row, "achievements"),
            picture_url: text(row, Bucket::Pictures.url_column()),
            cv_url: text(row, Bucket::Cv.url_column()),
            recommendation_url: text(row, Bucket::Letters.url_column()),
        })
    }

    pub fn full_name(&self) -> String {
        join_name(self.first_name.as_deref(), self.last_name.as_deref())
    }

    pub fn file_url(&self, bucket: Bucket) -> Option<&str> {
        match bucket {
            Bucket::Pictures => self.picture_url.as_deref(),
            Bucket::Cv => self.cv_url.as_deref(),
            Bucket::Letters => self.recommendation_url.as_deref(),
        }
    }
}

/// The few columns shown in list views.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplicantSummary {
    pub alias_email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub whatsapp: Option<String>,
    pub subscription_expiration: Option<NaiveDate>,
}

impl ApplicantSummary {
    pub fn from_row(row: &Row) -> Self {
        Self {
            alias_email: text(row, KEY_COLUMN).unwrap_or_else(|| "-".to_string()),
            first_name: text(row, "first_name"),
            last_name: text(row, "last_name"),
            whatsapp: text(row, "whatsapp"),
            subscription_expiration: date(row, EXPIRATION_COLUMN),
        }
    }

    pub fn full_name(&self) -> String {
        join_name(self.first_name.as_deref(), self.last_name.as_deref())
    }
}

fn join_name(first: Option<&str>, last: Option<&str>) -> String {
    match (first, last) {
        (Some(f), Some(l)) => format!("{f} {l}"),
        (Some(n), None) | (None, Some(n)) => n.to_string(),
        (None, None) => "-".to_string(),
    }
}

/// Render a scalar column as text. Empty strings and nulls are `None`.
pub fn text(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "Yes" } else { "No" }.to_string()),
        Value::Array(items) => {
            let parts = items.iter().filter_map(scalar).collect::<Vec<_>>();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Null | Value::Object(_) => None,
    }
}

/// List columns are stored either as JSON arrays or as comma separated text.
pub fn list(row: &Row, key: &str) -> Vec<String> {
    match row.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Parse a date column; timestamps are truncated to their date part.
pub fn date(row: &Row, key: &str) -> Option<NaiveDate> {
    let s = row.get(key)?.as_str()?.trim();
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn flag(row: &Row, key: &str) -> bool {
    match row.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

fn objects<'a>(row: &'a Row, key: &str) -> impl Iterator<Item = &'a Row> {
    row.get(key)
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_object())
}

fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn first_non_empty(a: Vec<String>, b: Vec<String>) -> Vec<String> {
    if a.is_empty() {
        b
    } else {
        a
    }
}
