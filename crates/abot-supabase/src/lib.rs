//! Hosted backend adapter.
//!
//! Implements the record-store port over the PostgREST table API
//! (`/rest/v1`) and the file-store port over object storage (`/storage/v1`).

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use abot_core::{
    applicant::Row,
    config::Config,
    domain::{Bucket, RecordSet},
    errors::Error,
    ports::{ApplicantStore, Columns, FileStore, Filter, PlanCount},
    Result,
};

#[derive(Clone, Debug)]
pub struct SupabaseClient {
    base_url: String,
    key: String,
    active_table: String,
    archive_table: String,
    plan_stats_rpc: String,
    pictures_bucket: String,
    cv_bucket: String,
    letters_bucket: String,
    http: reqwest::Client,
}

impl SupabaseClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.http_timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            base_url: cfg.supabase_url.trim_end_matches('/').to_string(),
            key: cfg.supabase_key.clone(),
            active_table: cfg.active_table.clone(),
            archive_table: cfg.archive_table.clone(),
            plan_stats_rpc: cfg.plan_stats_rpc.clone(),
            pictures_bucket: cfg.pictures_bucket.clone(),
            cv_bucket: cfg.cv_bucket.clone(),
            letters_bucket: cfg.letters_bucket.clone(),
            http,
        })
    }

    fn table(&self, set: RecordSet) -> &str {
        match set {
            RecordSet::Active => &self.active_table,
            RecordSet::Archived => &self.archive_table,
        }
    }

    fn bucket(&self, bucket: Bucket) -> &str {
        match bucket {
            Bucket::Pictures => &self.pictures_bucket,
            Bucket::Cv => &self.cv_bucket,
            Bucket::Letters => &self.letters_bucket,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    fn rest(&self, method: Method, set: RecordSet, filter: &Filter) -> RequestBuilder {
        self.request(method, &format!("/rest/v1/{}", self.table(set)))
            .query(&filter_params(filter))
    }
}

/// PostgREST query pairs: `column=op.value`.
pub fn filter_params(filter: &Filter) -> Vec<(String, String)> {
    filter
        .conditions
        .iter()
        .map(|c| (c.column.clone(), format!("{}.{}", c.op.as_str(), c.value)))
        .collect()
}

pub fn select_param(columns: Columns<'_>) -> String {
    match columns {
        Columns::All => "*".to_string(),
        Columns::Only(cols) => cols.join(","),
    }
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`.
pub fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn require_filter(filter: &Filter, action: &str) -> Result<()> {
    if filter.conditions.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "refusing to {action} without a filter"
        )));
    }
    Ok(())
}

async fn send(req: RequestBuilder, what: &str) -> Result<Response> {
    let resp = req
        .send()
        .await
        .map_err(|e| Error::Backend(format!("{what}: request error: {e}")))?;

    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let detail = body.chars().take(200).collect::<String>();
    tracing::warn!(%status, what, body = %detail, "backend request failed");
    Err(Error::Backend(format!("{what}: {status} {detail}")))
}

async fn rows(resp: Response, what: &str) -> Result<Vec<Row>> {
    let v: Value = resp
        .json()
        .await
        .map_err(|e| Error::Backend(format!("{what}: json error: {e}")))?;
    match v {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect()),
        Value::Object(row) => Ok(vec![row]),
        Value::Null => Ok(Vec::new()),
        other => Err(Error::Backend(format!(
            "{what}: unexpected response shape: {other}"
        ))),
    }
}

fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
}

/// One row of the plan statistics RPC.
#[derive(Debug, Deserialize)]
pub struct PlanRow {
    #[serde(rename = "application_plan")]
    plan: Option<String>,
    #[serde(default)]
    count: Value,
}

/// Rows without a plan are skipped; counts may arrive as numbers or strings.
pub fn plan_counts_from_rows(rows: Vec<PlanRow>) -> Vec<PlanCount> {
    rows.into_iter()
        .filter_map(|r| {
            let plan = r.plan?.trim().to_string();
            if plan.is_empty() {
                return None;
            }
            let count = match r.count {
                Value::Number(n) => n.as_u64()?,
                Value::String(s) => s.trim().parse().ok()?,
                _ => return None,
            };
            Some(PlanCount { plan, count })
        })
        .collect()
}

#[async_trait]
impl ApplicantStore for SupabaseClient {
    async fn select(
        &self,
        set: RecordSet,
        filter: &Filter,
        columns: Columns<'_>,
    ) -> Result<Vec<Row>> {
        let req = self
            .rest(Method::GET, set, filter)
            .query(&[("select", select_param(columns))]);
        let resp = send(req, "select").await?;
        rows(resp, "select").await
    }

    async fn update(&self, set: RecordSet, filter: &Filter, patch: Row) -> Result<Vec<Row>> {
        require_filter(filter, "update")?;
        let req = self
            .rest(Method::PATCH, set, filter)
            .header("Prefer", "return=representation")
            .json(&patch);
        let resp = send(req, "update").await?;
        rows(resp, "update").await
    }

    async fn insert(&self, set: RecordSet, row: Row) -> Result<()> {
        let req = self
            .request(Method::POST, &format!("/rest/v1/{}", self.table(set)))
            .header("Prefer", "return=minimal")
            .json(&row);
        send(req, "insert").await?;
        Ok(())
    }

    async fn delete(&self, set: RecordSet, filter: &Filter) -> Result<usize> {
        require_filter(filter, "delete")?;
        let req = self
            .rest(Method::DELETE, set, filter)
            .header("Prefer", "return=representation");
        let resp = send(req, "delete").await?;
        Ok(rows(resp, "delete").await?.len())
    }

    async fn count(&self, set: RecordSet, filter: &Filter) -> Result<u64> {
        let req = self
            .rest(Method::HEAD, set, filter)
            .query(&[("select", "*")])
            .header("Prefer", "count=exact");
        let resp = send(req, "count").await?;
        content_range_total(resp.headers())
            .ok_or_else(|| Error::Backend("count: missing Content-Range header".to_string()))
    }

    async fn plan_counts(&self) -> Result<Vec<PlanCount>> {
        let req = self
            .request(Method::POST, &format!("/rest/v1/rpc/{}", self.plan_stats_rpc))
            .json(&serde_json::json!({}));
        let resp = send(req, "plan stats").await?;
        let rows: Vec<PlanRow> = resp
            .json()
            .await
            .map_err(|e| Error::Backend(format!("plan stats: json error: {e}")))?;
        Ok(plan_counts_from_rows(rows))
    }
}

#[async_trait]
impl FileStore for SupabaseClient {
    async fn download(&self, bucket: Bucket, object: &str) -> Result<Vec<u8>> {
        let path = format!("/storage/v1/object/{}/{object}", self.bucket(bucket));
        let resp = self
            .request(Method::GET, &path)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("download {object}: request error: {e}")))?;

        // Storage answers a missing object with 404, or 400 carrying a "not_found" body.
        match resp.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(Error::NotFound(format!("file {object}")));
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                if body.contains("not_found") || body.contains("Object not found") {
                    return Err(Error::NotFound(format!("file {object}")));
                }
                return Err(Error::Backend(format!(
                    "download {object}: {status} {}",
                    body.chars().take(200).collect::<String>()
                )));
            }
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Backend(format!("download {object}: body error: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abot_core::domain::Lookup;
    use serde_json::json;

    fn config() -> Config {
        Config::from_lookup(|k| match k {
            "TELEGRAM_BOT_TOKEN" => Some("t".into()),
            "TELEGRAM_ALLOWED_USERS" => Some("1".into()),
            "SUPABASE_URL" => Some("https://proj.supabase.co/".into()),
            "SUPABASE_KEY" => Some("k".into()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn renders_filters_as_postgrest_pairs() {
        let f = Filter::by(&Lookup::AliasEmail("a@x.com".into()))
            .gte("subscription_expiration", "2026-01-01");
        assert_eq!(
            filter_params(&f),
            vec![
                ("alias_email".to_string(), "eq.a@x.com".to_string()),
                (
                    "subscription_expiration".to_string(),
                    "gte.2026-01-01".to_string()
                ),
            ]
        );
    }

    #[test]
    fn select_param_lists_columns() {
        assert_eq!(select_param(Columns::All), "*");
        assert_eq!(
            select_param(Columns::Only(&["alias_email", "payment"])),
            "alias_email,payment"
        );
    }

    #[test]
    fn parses_content_range_totals() {
        assert_eq!(parse_content_range("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-24/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[test]
    fn plan_counts_skip_rows_without_plan() {
        let rows: Vec<PlanRow> = serde_json::from_value(json!([
            {"application_plan": "premium", "count": 3},
            {"application_plan": null, "count": 9},
            {"application_plan": "normal", "count": "5"},
            {"count": 1},
        ]))
        .unwrap();
        assert_eq!(
            plan_counts_from_rows(rows),
            vec![
                PlanCount {
                    plan: "premium".into(),
                    count: 3
                },
                PlanCount {
                    plan: "normal".into(),
                    count: 5
                },
            ]
        );
    }

    #[test]
    fn tables_and_buckets_come_from_config() {
        let c = SupabaseClient::new(&config()).unwrap();
        assert_eq!(c.base_url, "https://proj.supabase.co");
        assert_eq!(c.table(RecordSet::Active), "applications");
        assert_eq!(c.table(RecordSet::Archived), "applications_archive");
        assert_eq!(c.bucket(Bucket::Letters), "letters");
    }

    #[tokio::test]
    async fn update_and_delete_require_a_filter() {
        let c = SupabaseClient::new(&config()).unwrap();
        let err = c
            .update(RecordSet::Active, &Filter::all(), Row::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = c.delete(RecordSet::Active, &Filter::all()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
