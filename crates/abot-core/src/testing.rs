//! In-memory storage ports for tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    applicant::{Row, PLAN_COLUMN},
    domain::{Bucket, ChatId, RecordSet},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{Document, InlineKeyboard},
    },
    ports::{ApplicantStore, Columns, FileStore, Filter, Op, PlanCount},
    Result,
};

pub fn applicant_row(alias: &str, payment: &str) -> Row {
    let v = json!({
        "id": alias.len(),
        "alias_email": alias,
        "first_name": "Test",
        "last_name": alias.split('@').next().unwrap_or("x"),
        "whatsapp": format!("216{}", alias.len()),
        "payment": payment,
        "application_plan": "normal",
        "subscription_expiration": null,
        "skills": ["Rust"],
        "roles": [{"title": "Engineer", "company": "Acme", "current": true}]
    });
    v.as_object().cloned().unwrap_or_default()
}

#[derive(Default)]
pub struct MemoryStore {
    active: Mutex<Vec<Row>>,
    archived: Mutex<Vec<Row>>,
    files: Mutex<HashMap<(Bucket, String), Vec<u8>>>,
    offline: AtomicBool,
    fail_inserts: AtomicBool,
    fail_deletes_in: Mutex<Vec<RecordSet>>,
    fail_plan_counts: AtomicBool,
    updates: AtomicUsize,
}

impl MemoryStore {
    pub fn seed(&self, set: RecordSet, row: Row) {
        self.set(set).lock().unwrap().push(row);
    }

    pub fn put_file(&self, bucket: Bucket, name: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert((bucket, name.to_string()), bytes.to_vec());
    }

    pub fn rows(&self, set: RecordSet) -> Vec<Row> {
        self.set(set).lock().unwrap().clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make deletes fail in each of `sets`; an empty slice restores them.
    pub fn fail_deletes_in(&self, sets: &[RecordSet]) {
        *self.fail_deletes_in.lock().unwrap() = sets.to_vec();
    }

    pub fn fail_plan_counts(&self, fail: bool) {
        self.fail_plan_counts.store(fail, Ordering::SeqCst);
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn set(&self, set: RecordSet) -> &Mutex<Vec<Row>> {
        match set {
            RecordSet::Active => &self.active,
            RecordSet::Archived => &self.archived,
        }
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Backend("connection refused".to_string()));
        }
        Ok(())
    }
}

fn cell(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn matches(row: &Row, filter: &Filter) -> bool {
    filter.conditions.iter().all(|c| {
        let Some(v) = cell(row, &c.column) else {
            return false;
        };
        match c.op {
            Op::Eq => v == c.value,
            Op::Lt => v < c.value,
            Op::Gte => v >= c.value,
            Op::Lte => v <= c.value,
        }
    })
}

fn project(row: &Row, columns: Columns<'_>) -> Row {
    match columns {
        Columns::All => row.clone(),
        Columns::Only(cols) => row
            .iter()
            .filter(|(k, _)| cols.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

#[async_trait]
impl ApplicantStore for MemoryStore {
    async fn select(
        &self,
        set: RecordSet,
        filter: &Filter,
        columns: Columns<'_>,
    ) -> Result<Vec<Row>> {
        self.check_online()?;
        let rows = self.set(set).lock().unwrap();
        Ok(rows
            .iter()
            .filter(|r| matches(r, filter))
            .map(|r| project(r, columns))
            .collect())
    }

    async fn update(&self, set: RecordSet, filter: &Filter, patch: Row) -> Result<Vec<Row>> {
        self.check_online()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.set(set).lock().unwrap();
        let mut out = Vec::new();
        for row in rows.iter_mut().filter(|r| matches(r, filter)) {
            for (k, v) in &patch {
                row.insert(k.clone(), v.clone());
            }
            out.push(row.clone());
        }
        Ok(out)
    }

    async fn insert(&self, set: RecordSet, row: Row) -> Result<()> {
        self.check_online()?;
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Error::Backend("insert rejected".to_string()));
        }
        self.set(set).lock().unwrap().push(row);
        Ok(())
    }

    async fn delete(&self, set: RecordSet, filter: &Filter) -> Result<usize> {
        self.check_online()?;
        if self.fail_deletes_in.lock().unwrap().contains(&set) {
            return Err(Error::Backend("delete rejected".to_string()));
        }
        let mut rows = self.set(set).lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !matches(r, filter));
        Ok(before - rows.len())
    }

    async fn count(&self, set: RecordSet, filter: &Filter) -> Result<u64> {
        self.check_online()?;
        let rows = self.set(set).lock().unwrap();
        Ok(rows.iter().filter(|r| matches(r, filter)).count() as u64)
    }

    async fn plan_counts(&self) -> Result<Vec<PlanCount>> {
        self.check_online()?;
        if self.fail_plan_counts.load(Ordering::SeqCst) {
            return Err(Error::Backend("rpc missing".to_string()));
        }
        let rows = self.active.lock().unwrap();
        let mut counts: Vec<PlanCount> = Vec::new();
        for plan in rows.iter().filter_map(|r| cell(r, PLAN_COLUMN)) {
            match counts.iter_mut().find(|p| p.plan == plan) {
                Some(p) => p.count += 1,
                None => counts.push(PlanCount { plan, count: 1 }),
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn download(&self, bucket: Bucket, object: &str) -> Result<Vec<u8>> {
        self.check_online()?;
        self.files
            .lock()
            .unwrap()
            .get(&(bucket, object.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object {object}")))
    }
}

/// Messenger that records what would have been sent.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(ChatId, String)>>,
    reject_containing: Mutex<Option<String>>,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Make `send_html` fail for any text containing `marker`.
    pub fn reject_html_containing(&self, marker: &str) {
        *self.reject_containing.lock().unwrap() = Some(marker.to_string());
    }

    fn record(&self, chat_id: ChatId, text: String) -> Result<()> {
        if let Some(marker) = self.reject_containing.lock().unwrap().as_deref() {
            if text.contains(marker) {
                return Err(Error::External("Bad Request: can't parse entities".to_string()));
            }
        }
        self.sent.lock().unwrap().push((chat_id, text));
        Ok(())
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.record(chat_id, html.to_string())
    }

    async fn send_document(&self, chat_id: ChatId, document: Document) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id, format!("[document] {}", document.file_name)));
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        _keyboard: InlineKeyboard,
    ) -> Result<()> {
        self.record(chat_id, html.to_string())
    }

    async fn answer_callback_query(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }
}
