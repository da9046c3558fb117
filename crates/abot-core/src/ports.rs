//! Hexagonal ports for the hosted backend.
//!
//! `abot-supabase` implements both traits over HTTP; tests use an in-memory
//! implementation.

use async_trait::async_trait;

use crate::{
    applicant::Row,
    domain::{Bucket, Lookup, RecordSet},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Eq,
    Lt,
    Gte,
    Lte,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Lt => "lt",
            Op::Gte => "gte",
            Op::Lte => "lte",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub column: String,
    pub op: Op,
    pub value: String,
}

/// A conjunction of column conditions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by(lookup: &Lookup) -> Self {
        Self::all().eq(lookup.column(), lookup.value())
    }

    pub fn eq(self, column: &str, value: impl Into<String>) -> Self {
        self.with(column, Op::Eq, value)
    }

    pub fn lt(self, column: &str, value: impl Into<String>) -> Self {
        self.with(column, Op::Lt, value)
    }

    pub fn gte(self, column: &str, value: impl Into<String>) -> Self {
        self.with(column, Op::Gte, value)
    }

    pub fn lte(self, column: &str, value: impl Into<String>) -> Self {
        self.with(column, Op::Lte, value)
    }

    fn with(mut self, column: &str, op: Op, value: impl Into<String>) -> Self {
        self.conditions.push(Condition {
            column: column.to_string(),
            op,
            value: value.into(),
        });
        self
    }
}

/// Which columns a select should return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Columns<'a> {
    All,
    Only(&'a [&'a str]),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanCount {
    pub plan: String,
    pub count: u64,
}

/// Record store holding the active and archived applicant sets.
#[async_trait]
pub trait ApplicantStore: Send + Sync {
    async fn select(&self, set: RecordSet, filter: &Filter, columns: Columns<'_>)
        -> Result<Vec<Row>>;

    /// Apply `patch` to every matching row; returns the rows after the update.
    async fn update(&self, set: RecordSet, filter: &Filter, patch: Row) -> Result<Vec<Row>>;

    async fn insert(&self, set: RecordSet, row: Row) -> Result<()>;

    /// Returns the number of removed rows.
    async fn delete(&self, set: RecordSet, filter: &Filter) -> Result<usize>;

    async fn count(&self, set: RecordSet, filter: &Filter) -> Result<u64>;

    /// Active applicants grouped by application plan.
    async fn plan_counts(&self) -> Result<Vec<PlanCount>>;
}

/// Binary object buckets (picture, CV, recommendation letters).
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn download(&self, bucket: Bucket, object: &str) -> Result<Vec<u8>>;
}

/// Object name inside a bucket for a stored file URL: its last path segment.
pub fn object_name(file_url: &str) -> Option<&str> {
    let without_query = file_url.split(['?', '#']).next().unwrap_or(file_url);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
}
