//! Remote feature source contracts + the CartoDB and ArcGIS provider
//! adapters, with id-range pagination and bounded fixed-delay retries.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use gaz_core::{FeatureRow, Geometry, ProviderConfig, RemapRow, SourceTableConfig};
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "gaz-adapters";

#[derive(Debug, Error)]
pub enum SourceError {
    /// Transient transport failure; the page fetch may be retried.
    #[error("remote source unavailable: {0}")]
    Unavailable(String),
    /// The provider answered but the payload cannot be trusted: embedded
    /// error marker, missing column, undecodable body. Fatal to the pass —
    /// a truncated page poisons the orphan arithmetic downstream.
    #[error("malformed response from remote source: {0}")]
    Malformed(String),
}

impl SourceError {
    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            SourceError::Unavailable(err.to_string())
        } else {
            SourceError::Malformed(err.to_string())
        }
    }

    fn from_status(status: StatusCode, url: &str) -> Self {
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            SourceError::Unavailable(format!("http status {status} for {url}"))
        } else {
            SourceError::Malformed(format!("http status {status} for {url}"))
        }
    }
}

/// Paginated access to one remote dataset of geo-features. Pages are keyed
/// by a monotonically increasing synthetic row id, not offset/limit, so
/// concurrent writes on the provider side cannot shift rows between pages.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    fn dataset_name(&self) -> &str;
    fn has_remap_table(&self) -> bool;
    async fn row_count(&self) -> Result<u64, SourceError>;
    async fn max_row_id(&self) -> Result<u64, SourceError>;
    async fn fetch_page(
        &self,
        low_exclusive: u64,
        high_inclusive: u64,
    ) -> Result<Vec<FeatureRow>, SourceError>;
    async fn fetch_remap_rows(&self) -> Result<Vec<RemapRow>, SourceError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(100),
        }
    }
}

/// Page size for an id-keyed scan. When the id space is much sparser than
/// the row count, fixed paging would issue an unbounded number of requests;
/// one oversized page covering everything is the failsafe.
pub fn page_size_for(row_count: u64, max_id: u64) -> u64 {
    if max_id > row_count.saturating_mul(5) {
        warn!("the source primary key seems off, pagination is not possible");
        max_id + 1
    } else {
        100
    }
}

async fn with_retries<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last = None;
    for attempt in 1..=attempts {
        if attempt > 1 {
            warn!("retrying {what} (attempt {attempt}/{attempts})");
        }
        // do not hammer the provider, even on the first attempt
        tokio::time::sleep(policy.delay).await;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err @ SourceError::Malformed(_)) => return Err(err),
            Err(err) => last = Some(err),
        }
    }
    Err(last.expect("retry loop captured an error"))
}

/// Fetches every feature row of the dataset, page by page. Any malformed
/// page or exhausted retry budget aborts the whole scan.
pub async fn fetch_all_rows(
    source: &dyn FeatureSource,
    policy: RetryPolicy,
) -> Result<Vec<FeatureRow>, SourceError> {
    let row_count = with_retries(policy, "row count", || source.row_count()).await?;
    let max_id = with_retries(policy, "max row id", || source.max_row_id()).await?;
    if row_count == 0 {
        info!("{} is empty upstream", source.dataset_name());
        return Ok(Vec::new());
    }

    let limit = page_size_for(row_count, max_id);
    let mut rows = Vec::new();
    let mut offset = 0u64;
    while offset <= max_id {
        let (low, high) = (offset, offset + limit);
        info!(
            "requesting rows between {low} and {high} for {}",
            source.dataset_name()
        );
        let page = with_retries(policy, "feature page", || source.fetch_page(low, high)).await?;
        rows.extend(page);
        offset += limit;
    }
    Ok(rows)
}

/// Fetches the remap table, if the source has one configured.
pub async fn fetch_remap_rows(
    source: &dyn FeatureSource,
    policy: RetryPolicy,
) -> Result<Vec<RemapRow>, SourceError> {
    if !source.has_remap_table() {
        return Ok(Vec::new());
    }
    with_retries(policy, "remap table", || source.fetch_remap_rows()).await
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: "gaz-sync/0.1".to_string(),
        }
    }
}

/// Thin JSON-over-GET client shared by both provider adapters.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
}

impl HttpApi {
    pub fn new(config: &HttpClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("building reqwest client")?;
        Ok(Self { client })
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<JsonValue, SourceError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(SourceError::from_transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::from_status(status, url));
        }
        resp.json()
            .await
            .map_err(|err| SourceError::Malformed(format!("decoding response from {url}: {err}")))
    }
}

/// Providers can embed an "error" member inside an otherwise-200 body when
/// they fail mid-stream; such a page is truncated and must not be consumed.
fn ensure_no_error_marker(value: &JsonValue) -> Result<(), SourceError> {
    if let Some(err) = value.get("error") {
        return Err(SourceError::Malformed(format!(
            "provider error marker in response: {err}"
        )));
    }
    Ok(())
}

fn cell_string(row: &JsonValue, key: &str) -> Result<String, SourceError> {
    match row.get(key) {
        None => Err(SourceError::Malformed(format!(
            "row missing required column {key}"
        ))),
        Some(JsonValue::Null) => Ok(String::new()),
        Some(JsonValue::String(s)) => Ok(s.clone()),
        Some(JsonValue::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(SourceError::Malformed(format!(
            "column {key} holds unsupported value {other}"
        ))),
    }
}

fn cell_opt_string(row: &JsonValue, key: &str) -> Option<String> {
    match row.get(key) {
        Some(JsonValue::String(s)) => Some(s.clone()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn scalar_u64(value: &JsonValue, key: &str) -> Result<u64, SourceError> {
    let cell = value
        .get("rows")
        .and_then(|rows| rows.get(0))
        .and_then(|row| row.get(key))
        .ok_or_else(|| SourceError::Malformed(format!("response missing rows[0].{key}")))?;
    match cell {
        // MAX() over an empty table comes back as null
        JsonValue::Null => Ok(0),
        JsonValue::Number(n) => n
            .as_u64()
            .ok_or_else(|| SourceError::Malformed(format!("{key} is not an unsigned integer"))),
        JsonValue::String(s) => s
            .parse()
            .map_err(|_| SourceError::Malformed(format!("{key} is not an unsigned integer"))),
        other => Err(SourceError::Malformed(format!(
            "{key} holds unsupported value {other}"
        ))),
    }
}

fn feature_rows_from(
    value: &JsonValue,
    name_col: &str,
    pcode_col: &str,
    parent_code_col: Option<&str>,
) -> Result<Vec<FeatureRow>, SourceError> {
    ensure_no_error_marker(value)?;
    let rows = value
        .get("rows")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| SourceError::Malformed("response missing rows".to_string()))?;
    rows.iter()
        .map(|row| {
            let geometry = match row.get("the_geom") {
                None => {
                    return Err(SourceError::Malformed(
                        "row missing required column the_geom".to_string(),
                    ))
                }
                Some(JsonValue::Null) => None,
                Some(JsonValue::String(s)) => Some(Geometry::new(s.clone())),
                Some(other) => Some(Geometry::new(other.to_string())),
            };
            Ok(FeatureRow {
                pcode: cell_string(row, pcode_col)?,
                name: cell_string(row, name_col)?,
                parent_code: parent_code_col.and_then(|col| cell_opt_string(row, col)),
                geometry,
            })
        })
        .collect()
}

fn remap_matching(row: &JsonValue) -> Result<bool, SourceError> {
    match row.get("matching") {
        None | Some(JsonValue::Null) => Ok(true),
        Some(JsonValue::Bool(b)) => Ok(*b),
        Some(JsonValue::Number(n)) => Ok(n.as_i64().unwrap_or(0) != 0),
        Some(other) => Err(SourceError::Malformed(format!(
            "column matching holds unsupported value {other}"
        ))),
    }
}

fn remap_rows_from(rows: &[JsonValue]) -> Result<Vec<RemapRow>, SourceError> {
    rows.iter()
        .map(|row| {
            Ok(RemapRow {
                old_pcode: cell_string(row, "old_pcode")?,
                new_pcode: cell_string(row, "new_pcode")?,
                matching: remap_matching(row)?,
            })
        })
        .collect()
}

/// CartoDB SQL API source. Queries are built from the configured column
/// names; geometry travels as `st_AsGeoJSON(the_geom)`.
pub struct CartoSqlSource {
    http: HttpApi,
    sql_url: String,
    api_key: Option<String>,
    table_name: String,
    name_col: String,
    pcode_col: String,
    parent_code_col: Option<String>,
    remap_table: Option<String>,
}

impl CartoSqlSource {
    async fn sql(&self, query: &str) -> Result<JsonValue, SourceError> {
        let mut params = vec![("q".to_string(), query.to_string())];
        if let Some(key) = &self.api_key {
            params.push(("api_key".to_string(), key.clone()));
        }
        let value = self.http.get_json(&self.sql_url, &params).await?;
        ensure_no_error_marker(&value)?;
        Ok(value)
    }

    fn base_select(&self) -> String {
        let parent = self
            .parent_code_col
            .as_deref()
            .map(|col| format!(", {col}"))
            .unwrap_or_default();
        format!(
            "select st_AsGeoJSON(the_geom) as the_geom, {}, {}{parent} from {}",
            self.name_col, self.pcode_col, self.table_name
        )
    }
}

#[async_trait]
impl FeatureSource for CartoSqlSource {
    fn dataset_name(&self) -> &str {
        &self.table_name
    }

    fn has_remap_table(&self) -> bool {
        self.remap_table.is_some()
    }

    async fn row_count(&self) -> Result<u64, SourceError> {
        let value = self
            .sql(&format!("select count(*) from {}", self.table_name))
            .await?;
        scalar_u64(&value, "count")
    }

    async fn max_row_id(&self) -> Result<u64, SourceError> {
        let value = self
            .sql(&format!("select MAX(cartodb_id) from {}", self.table_name))
            .await?;
        scalar_u64(&value, "max")
    }

    async fn fetch_page(
        &self,
        low_exclusive: u64,
        high_inclusive: u64,
    ) -> Result<Vec<FeatureRow>, SourceError> {
        let query = format!(
            "{} WHERE cartodb_id > {low_exclusive} AND cartodb_id <= {high_inclusive}",
            self.base_select()
        );
        let value = self.sql(&query).await?;
        feature_rows_from(
            &value,
            &self.name_col,
            &self.pcode_col,
            self.parent_code_col.as_deref(),
        )
    }

    async fn fetch_remap_rows(&self) -> Result<Vec<RemapRow>, SourceError> {
        let Some(remap_table) = &self.remap_table else {
            return Ok(Vec::new());
        };
        let value = self
            .sql(&format!(
                "select old_pcode::text, new_pcode::text, matching::int from {remap_table}"
            ))
            .await?;
        let rows = value
            .get("rows")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| SourceError::Malformed("response missing rows".to_string()))?;
        remap_rows_from(rows)
    }
}

/// ArcGIS REST feature-layer source, paginated over `objectid`.
pub struct ArcgisSource {
    http: HttpApi,
    service_url: String,
    remap_service_url: Option<String>,
    name_col: String,
    pcode_col: String,
    parent_code_col: Option<String>,
}

impl ArcgisSource {
    fn query_url(service_url: &str) -> String {
        format!("{}/query", service_url.trim_end_matches('/'))
    }

    async fn query(
        &self,
        service_url: &str,
        params: &[(String, String)],
    ) -> Result<JsonValue, SourceError> {
        let value = self
            .http
            .get_json(&Self::query_url(service_url), params)
            .await?;
        ensure_no_error_marker(&value)?;
        Ok(value)
    }
}

fn arcgis_params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn geojson_features_to_rows(
    value: &JsonValue,
    name_col: &str,
    pcode_col: &str,
    parent_code_col: Option<&str>,
) -> Result<Vec<FeatureRow>, SourceError> {
    ensure_no_error_marker(value)?;
    let features = value
        .get("features")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| SourceError::Malformed("response missing features".to_string()))?;
    features
        .iter()
        .map(|feature| {
            let properties = feature
                .get("properties")
                .or_else(|| feature.get("attributes"))
                .ok_or_else(|| {
                    SourceError::Malformed("feature missing properties".to_string())
                })?;
            let geometry = match feature.get("geometry") {
                None | Some(JsonValue::Null) => None,
                Some(geom) => Some(Geometry::new(geom.to_string())),
            };
            Ok(FeatureRow {
                pcode: cell_string(properties, pcode_col)?,
                name: cell_string(properties, name_col)?,
                parent_code: parent_code_col.and_then(|col| cell_opt_string(properties, col)),
                geometry,
            })
        })
        .collect()
}

#[async_trait]
impl FeatureSource for ArcgisSource {
    fn dataset_name(&self) -> &str {
        &self.service_url
    }

    fn has_remap_table(&self) -> bool {
        self.remap_service_url.is_some()
    }

    async fn row_count(&self) -> Result<u64, SourceError> {
        let params = arcgis_params(&[("where", "1=1"), ("returnCountOnly", "true"), ("f", "json")]);
        let value = self.query(&self.service_url, &params).await?;
        value
            .get("count")
            .and_then(JsonValue::as_u64)
            .ok_or_else(|| SourceError::Malformed("response missing count".to_string()))
    }

    async fn max_row_id(&self) -> Result<u64, SourceError> {
        let stats =
            r#"[{"statisticType":"max","onStatisticField":"objectid","outStatisticFieldName":"max_oid"}]"#;
        let params = arcgis_params(&[("where", "1=1"), ("outStatistics", stats), ("f", "json")]);
        let value = self.query(&self.service_url, &params).await?;
        let cell = value
            .get("features")
            .and_then(|features| features.get(0))
            .and_then(|feature| feature.get("attributes"))
            .and_then(|attrs| attrs.get("max_oid"))
            .ok_or_else(|| SourceError::Malformed("response missing max_oid".to_string()))?;
        match cell {
            JsonValue::Null => Ok(0),
            other => other
                .as_u64()
                .ok_or_else(|| SourceError::Malformed("max_oid is not an unsigned integer".to_string())),
        }
    }

    async fn fetch_page(
        &self,
        low_exclusive: u64,
        high_inclusive: u64,
    ) -> Result<Vec<FeatureRow>, SourceError> {
        let predicate = format!("objectid > {low_exclusive} AND objectid <= {high_inclusive}");
        let params = arcgis_params(&[
            ("where", predicate.as_str()),
            ("outFields", "*"),
            ("returnGeometry", "true"),
            ("outSR", "4326"),
            ("f", "geojson"),
        ]);
        let value = self.query(&self.service_url, &params).await?;
        geojson_features_to_rows(
            &value,
            &self.name_col,
            &self.pcode_col,
            self.parent_code_col.as_deref(),
        )
    }

    async fn fetch_remap_rows(&self) -> Result<Vec<RemapRow>, SourceError> {
        let Some(remap_service_url) = &self.remap_service_url else {
            return Ok(Vec::new());
        };
        let params = arcgis_params(&[("where", "1=1"), ("outFields", "*"), ("f", "json")]);
        let value = self.query(remap_service_url, &params).await?;
        let features = value
            .get("features")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| SourceError::Malformed("response missing features".to_string()))?;
        let attributes: Vec<JsonValue> = features
            .iter()
            .map(|feature| feature.get("attributes").cloned().unwrap_or(JsonValue::Null))
            .collect();
        remap_rows_from(&attributes)
    }
}

/// Builds the provider adapter matching a table's configuration.
pub fn source_for_table(http: &HttpApi, table: &SourceTableConfig) -> Box<dyn FeatureSource> {
    match &table.provider {
        ProviderConfig::Cartodb {
            domain,
            table_name,
            api_key,
            remap_table,
        } => Box::new(CartoSqlSource {
            http: http.clone(),
            sql_url: format!("https://{domain}.carto.com/api/v2/sql"),
            api_key: api_key.clone(),
            table_name: table_name.clone(),
            name_col: table.name_col.clone(),
            pcode_col: table.pcode_col.clone(),
            parent_code_col: table.parent_code_col.clone(),
            remap_table: remap_table.clone(),
        }),
        ProviderConfig::Arcgis {
            service_url,
            remap_service_url,
        } => Box::new(ArcgisSource {
            http: http.clone(),
            service_url: service_url.clone(),
            remap_service_url: remap_service_url.clone(),
            name_col: table.name_col.clone(),
            pcode_col: table.pcode_col.clone(),
            parent_code_col: table.parent_code_col.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaz_core::GeometryKind;
    use std::sync::Mutex;

    #[test]
    fn page_size_defaults_to_a_hundred() {
        assert_eq!(page_size_for(250, 260), 100);
    }

    #[test]
    fn sparse_id_space_collapses_to_one_page() {
        // 3 rows with ids up to 1200: fixed paging would need 12 requests
        // for 3 rows, so everything goes into a single oversized page.
        assert_eq!(page_size_for(3, 1200), 1201);
    }

    #[test]
    fn carto_rows_parse_with_numeric_pcodes_and_parent() {
        let value: JsonValue = serde_json::from_str(
            r#"{"rows":[
                {"the_geom":"{\"type\":\"Point\",\"coordinates\":[30.0,-1.9]}",
                 "name":"Kigali","pcode":101,"parent":"RW"},
                {"the_geom":null,"name":"Butare","pcode":"RW02","parent":null}
            ]}"#,
        )
        .expect("payload");
        let rows = feature_rows_from(&value, "name", "pcode", Some("parent")).expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pcode, "101");
        assert_eq!(rows[0].parent_code.as_deref(), Some("RW"));
        assert_eq!(
            rows[0].geometry.as_ref().map(Geometry::kind),
            Some(GeometryKind::Point)
        );
        assert!(rows[1].geometry.is_none());
        assert!(rows[1].parent_code.is_none());
    }

    #[test]
    fn embedded_error_marker_fails_the_page() {
        let value: JsonValue =
            serde_json::from_str(r#"{"rows":[],"error":["query timed out"]}"#).expect("payload");
        let err = feature_rows_from(&value, "name", "pcode", None).unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[test]
    fn missing_required_column_fails_the_page() {
        let value: JsonValue =
            serde_json::from_str(r#"{"rows":[{"the_geom":null,"name":"Kigali"}]}"#)
                .expect("payload");
        let err = feature_rows_from(&value, "name", "pcode", None).unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[test]
    fn scalar_parsing_tolerates_null_max() {
        let value: JsonValue =
            serde_json::from_str(r#"{"rows":[{"count":42,"max":null}]}"#).expect("payload");
        assert_eq!(scalar_u64(&value, "count").expect("count"), 42);
        assert_eq!(scalar_u64(&value, "max").expect("max"), 0);
    }

    #[test]
    fn remap_rows_parse_matching_flag_variants() {
        let rows: Vec<JsonValue> = serde_json::from_str(
            r#"[
                {"old_pcode":"RWA","new_pcode":"RW","matching":1},
                {"old_pcode":"PER","new_pcode":"PE","matching":0},
                {"old_pcode":"BDI","new_pcode":"BI"}
            ]"#,
        )
        .expect("payload");
        let parsed = remap_rows_from(&rows).expect("remap rows");
        assert!(parsed[0].matching);
        assert!(!parsed[1].matching);
        assert!(parsed[2].matching);
    }

    #[test]
    fn arcgis_geojson_features_parse() {
        let value: JsonValue = serde_json::from_str(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature",
                 "properties":{"name":"Kigali","pcode":"RW01","parent":"RW"},
                 "geometry":{"type":"Point","coordinates":[30.06,-1.94]}},
                {"type":"Feature",
                 "properties":{"name":"Unknown","pcode":"RW99"},
                 "geometry":null}
            ]}"#,
        )
        .expect("payload");
        let rows = geojson_features_to_rows(&value, "name", "pcode", Some("parent")).expect("rows");
        assert_eq!(rows[0].pcode, "RW01");
        assert_eq!(
            rows[0].geometry.as_ref().map(Geometry::kind),
            Some(GeometryKind::Point)
        );
        assert!(rows[1].geometry.is_none());
    }

    struct ScriptedSource {
        rows: Vec<FeatureRow>,
        failures_left: Mutex<u32>,
    }

    impl ScriptedSource {
        fn new(rows: Vec<FeatureRow>, failures: u32) -> Self {
            Self {
                rows,
                failures_left: Mutex::new(failures),
            }
        }
    }

    #[async_trait]
    impl FeatureSource for ScriptedSource {
        fn dataset_name(&self) -> &str {
            "scripted"
        }

        fn has_remap_table(&self) -> bool {
            false
        }

        async fn row_count(&self) -> Result<u64, SourceError> {
            Ok(self.rows.len() as u64)
        }

        async fn max_row_id(&self) -> Result<u64, SourceError> {
            Ok(self.rows.len() as u64)
        }

        async fn fetch_page(
            &self,
            low_exclusive: u64,
            high_inclusive: u64,
        ) -> Result<Vec<FeatureRow>, SourceError> {
            let mut failures = self.failures_left.lock().expect("lock");
            if *failures > 0 {
                *failures -= 1;
                return Err(SourceError::Unavailable("connection reset".to_string()));
            }
            Ok(self
                .rows
                .iter()
                .enumerate()
                .filter(|(idx, _)| {
                    let id = *idx as u64 + 1;
                    id > low_exclusive && id <= high_inclusive
                })
                .map(|(_, row)| row.clone())
                .collect())
        }

        async fn fetch_remap_rows(&self) -> Result<Vec<RemapRow>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn feature(pcode: &str) -> FeatureRow {
        FeatureRow {
            pcode: pcode.to_string(),
            name: pcode.to_string(),
            parent_code: None,
            geometry: None,
        }
    }

    fn instant_retries(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_the_page_arrives() {
        let source = ScriptedSource::new(vec![feature("RW"), feature("RW01")], 2);
        let rows = fetch_all_rows(&source, instant_retries(5)).await.expect("rows");
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_abort_the_scan() {
        let source = ScriptedSource::new(vec![feature("RW")], 10);
        let err = fetch_all_rows(&source, instant_retries(3)).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }
}
