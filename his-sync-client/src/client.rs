use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::endpoint::{Endpoint, DEFAULT_TIMEOUT};
use crate::error::{ClientError, ClientResult};
use crate::report::{ImportReport, TrackerImportReport};
use crate::types::{ImportStrategy, MergeMode, Pager, SystemInfo};

/// Query parameters for a metadata GET (spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct MetadataQuery {
    pub fields: String,
    pub filter: Option<String>,
    pub page_size: u32,
}

/// Query parameters for an aggregate-data GET (spec.md §4.2).
#[derive(Debug, Clone, Default)]
pub struct AggregateQuery {
    pub org_units: Vec<String>,
    pub data_sets: Vec<String>,
    pub data_elements: Vec<String>,
    pub periods: Vec<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Query parameters for an events GET (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub program: String,
    pub org_unit: Option<String>,
    pub ou_mode: Option<String>,
    pub start_date: String,
    pub end_date: String,
}

/// Query parameters for a tracked-entity-instance GET (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct TrackerQuery {
    pub program: String,
    pub org_unit: String,
    pub ou_mode: String,
    pub last_updated_start_date: Option<String>,
}

/// A tracker bundle, flattened the way spec.md §4.2 describes: parallel
/// lists of trackedEntities / enrollments / events rather than the
/// nested API shape.
#[derive(Debug, Clone, Default)]
pub struct TrackerBundle {
    pub tracked_entities: Vec<Value>,
    pub enrollments: Vec<Value>,
    pub events: Vec<Value>,
}

/// The HIS HTTP API, seamed behind a trait so pipelines can be driven
/// against an in-memory fake in tests (SPEC_FULL.md §8).
#[async_trait]
pub trait Dhis2Client: Send + Sync {
    async fn probe(&self) -> ClientResult<SystemInfo>;

    async fn get_metadata(&self, resource: &str, query: &MetadataQuery) -> ClientResult<Vec<Value>>;

    async fn post_metadata(
        &self,
        resource: &str,
        objects: Vec<Value>,
        strategy: ImportStrategy,
        merge_mode: MergeMode,
        skip_sharing: bool,
    ) -> ClientResult<ImportReport>;

    /// Reads the pager's `total` off a `pageSize=1` probe with the given
    /// `lastUpdated` filter (spec.md §4.5).
    async fn count_changed_since(&self, resource: &str, since_iso: &str) -> ClientResult<u64>;

    async fn get_aggregate_values(&self, query: &AggregateQuery) -> ClientResult<Vec<Value>>;

    async fn post_aggregate_values(&self, values: Vec<Value>) -> ClientResult<ImportReport>;

    async fn get_events(&self, query: &EventQuery) -> ClientResult<Vec<Value>>;

    async fn post_events(&self, events: Vec<Value>) -> ClientResult<ImportReport>;

    async fn get_tracked_entities(&self, query: &TrackerQuery) -> ClientResult<Vec<Value>>;

    async fn post_tracker_bundle(&self, bundle: &TrackerBundle) -> ClientResult<TrackerImportReport>;

    /// Legacy three-call fallback used when the combined tracker endpoint
    /// rejects the bundle (spec.md §4.2).
    async fn post_tracker_legacy(&self, bundle: &TrackerBundle) -> ClientResult<TrackerImportReport>;

    /// `None` when the server has no dedicated audit endpoint (HTTP 404),
    /// consumed by the change detector's audit-availability probe
    /// (SPEC_FULL.md §9, design note 1).
    async fn get_data_value_audit_count(&self, since_iso: &str) -> ClientResult<Option<u64>>;
}

/// The production client: one `reqwest::Client` per instance, reused
/// across calls (spec.md §5 connection pooling).
pub struct HttpDhis2Client {
    endpoint: Endpoint,
    http: Client,
}

impl HttpDhis2Client {
    pub fn new(endpoint: Endpoint) -> Self {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client builder should never fail with static config");
        Self { endpoint, http }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = self.endpoint.url(path);
        self.http
            .request(method, url)
            .basic_auth(&self.endpoint.username, Some(&self.endpoint.password))
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> ClientResult<Value> {
        let url = self.endpoint.url(path);
        let response = self
            .request(reqwest::Method::GET, path)
            .query(query)
            .send()
            .await
            .map_err(|source| ClientError::Transport { url: url.clone(), source })?;
        Self::parse_ok_body(response, &url).await
    }

    async fn post_json(&self, path: &str, query: &[(&str, String)], body: &Value) -> ClientResult<Value> {
        let url = self.endpoint.url(path);
        let response = self
            .request(reqwest::Method::POST, path)
            .query(query)
            .json(body)
            .send()
            .await
            .map_err(|source| ClientError::Transport { url: url.clone(), source })?;
        Self::parse_ok_body(response, &url).await
    }

    async fn parse_ok_body(response: reqwest::Response, url: &str) -> ClientResult<Value> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::Authentication {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::ResourceNotAvailable {
                resource: url.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        let text = response
            .text()
            .await
            .map_err(|source| ClientError::Transport { url: url.to_string(), source })?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|source| ClientError::Parse { url: url.to_string(), source })
    }

    /// Paged GET over a metadata-shaped endpoint that nests its array
    /// under `<resource>` and reports a `pager`. Pages until fewer than
    /// `pager.pageSize` results come back, matching dhis2's `paging=true`
    /// convention for resources that do support it.
    async fn get_paged(&self, resource: &str, query: &MetadataQuery) -> ClientResult<Vec<Value>> {
        let path = resource;
        let mut page = 1u32;
        let mut out = Vec::new();
        loop {
            let mut params = vec![
                ("fields".to_string(), query.fields.clone()),
                ("paging".to_string(), "true".to_string()),
                ("pageSize".to_string(), query.page_size.to_string()),
                ("page".to_string(), page.to_string()),
            ];
            if let Some(filter) = &query.filter {
                params.push(("filter".to_string(), filter.clone()));
            }
            let query_refs: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();

            let body = match self.get_json(path, &query_refs).await {
                Ok(body) => body,
                Err(ClientError::ResourceNotAvailable { .. }) => return Ok(Vec::new()),
                Err(err) => return Err(err),
            };

            let items = body
                .get(resource)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let got = items.len() as u32;
            out.extend(items);

            let pager: Option<Pager> = body.get("pager").and_then(|p| serde_json::from_value(p.clone()).ok());
            match pager {
                Some(pager) if got >= pager.page_size.unwrap_or(query.page_size as u64) as u32 && (got as u64) > 0 => {
                    page += 1;
                }
                _ => break,
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl Dhis2Client for HttpDhis2Client {
    async fn probe(&self) -> ClientResult<SystemInfo> {
        let body = self.get_json("system/info", &[]).await?;
        serde_json::from_value(body.clone()).map_err(|source| ClientError::Parse {
            url: self.endpoint.url("system/info"),
            source,
        })
    }

    async fn get_metadata(&self, resource: &str, query: &MetadataQuery) -> ClientResult<Vec<Value>> {
        self.get_paged(resource, query).await
    }

    async fn post_metadata(
        &self,
        _resource: &str,
        objects: Vec<Value>,
        strategy: ImportStrategy,
        merge_mode: MergeMode,
        skip_sharing: bool,
    ) -> ClientResult<ImportReport> {
        let mut params = vec![
            ("importStrategy".to_string(), strategy.as_param().to_string()),
            ("atomicMode".to_string(), "NONE".to_string()),
            ("mergeMode".to_string(), merge_mode.as_param().to_string()),
        ];
        if skip_sharing {
            params.push(("skipSharing".to_string(), "true".to_string()));
        }
        let query_refs: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        let body = json!({ "metadata": objects });
        let url = self.endpoint.url("metadata");
        let response = self.post_json("metadata", &query_refs, &body).await?;
        ImportReport::parse(&response, &url)
    }

    async fn count_changed_since(&self, resource: &str, since_iso: &str) -> ClientResult<u64> {
        let query = [
            ("filter".to_string(), format!("lastUpdated:gt:{since_iso}")),
            ("pageSize".to_string(), "1".to_string()),
            ("paging".to_string(), "true".to_string()),
        ];
        let query_refs: Vec<(&str, String)> = query.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        let body = match self.get_json(resource, &query_refs).await {
            Ok(body) => body,
            Err(ClientError::ResourceNotAvailable { .. }) => return Ok(0),
            Err(err) => return Err(err),
        };
        let total = body
            .get("pager")
            .and_then(|p| p.get("total"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(total)
    }

    async fn get_aggregate_values(&self, query: &AggregateQuery) -> ClientResult<Vec<Value>> {
        let mut params = vec![("paging".to_string(), "false".to_string())];
        if !query.org_units.is_empty() {
            params.push(("orgUnit".to_string(), query.org_units.join(";")));
        }
        if !query.data_sets.is_empty() {
            params.push(("dataSet".to_string(), query.data_sets.join(";")));
        }
        if !query.data_elements.is_empty() {
            params.push(("dataElement".to_string(), query.data_elements.join(";")));
        }
        if !query.periods.is_empty() {
            params.push(("period".to_string(), query.periods.join(";")));
        }
        if let Some(start) = &query.start_date {
            params.push(("startDate".to_string(), start.clone()));
        }
        if let Some(end) = &query.end_date {
            params.push(("endDate".to_string(), end.clone()));
        }
        let query_refs: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        let body = self.get_json("dataValueSets", &query_refs).await?;
        Ok(body
            .get("dataValues")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn post_aggregate_values(&self, values: Vec<Value>) -> ClientResult<ImportReport> {
        let params = [
            ("dryRun".to_string(), "false".to_string()),
            ("atomicMode".to_string(), "NONE".to_string()),
            ("dataElementIdScheme".to_string(), "UID".to_string()),
            ("orgUnitIdScheme".to_string(), "UID".to_string()),
            ("idScheme".to_string(), "UID".to_string()),
        ];
        let query_refs: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        let body = json!({ "dataValues": values });
        let url = self.endpoint.url("dataValueSets");
        let response = self.post_json("dataValueSets", &query_refs, &body).await?;
        ImportReport::parse(&response, &url)
    }

    async fn get_events(&self, query: &EventQuery) -> ClientResult<Vec<Value>> {
        let mut params = vec![
            ("program".to_string(), query.program.clone()),
            ("startDate".to_string(), query.start_date.clone()),
            ("endDate".to_string(), query.end_date.clone()),
            ("paging".to_string(), "false".to_string()),
        ];
        if let Some(ou) = &query.org_unit {
            params.push(("orgUnit".to_string(), ou.clone()));
        }
        if let Some(mode) = &query.ou_mode {
            params.push(("ouMode".to_string(), mode.clone()));
        }
        let query_refs: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        let body = self.get_json("events", &query_refs).await?;
        Ok(body
            .get("events")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn post_events(&self, events: Vec<Value>) -> ClientResult<ImportReport> {
        let params = [
            ("importStrategy".to_string(), "CREATE_AND_UPDATE".to_string()),
            ("atomicMode".to_string(), "NONE".to_string()),
            ("async".to_string(), "false".to_string()),
        ];
        let query_refs: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        let body = json!({ "events": events });
        let url = self.endpoint.url("events");
        let response = self.post_json("events", &query_refs, &body).await?;
        ImportReport::parse(&response, &url)
    }

    async fn get_tracked_entities(&self, query: &TrackerQuery) -> ClientResult<Vec<Value>> {
        let mut params = vec![
            ("program".to_string(), query.program.clone()),
            ("orgUnit".to_string(), query.org_unit.clone()),
            ("ouMode".to_string(), query.ou_mode.clone()),
            ("paging".to_string(), "false".to_string()),
        ];
        if let Some(since) = &query.last_updated_start_date {
            params.push(("lastUpdatedStartDate".to_string(), since.clone()));
        }
        let query_refs: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        let body = self.get_json("trackedEntityInstances", &query_refs).await?;
        Ok(body
            .get("trackedEntityInstances")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn post_tracker_bundle(&self, bundle: &TrackerBundle) -> ClientResult<TrackerImportReport> {
        let params = [("importStrategy".to_string(), "CREATE_AND_UPDATE".to_string()), ("atomicMode".to_string(), "NONE".to_string())];
        let query_refs: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        let body = json!({
            "trackedEntities": bundle.tracked_entities,
            "enrollments": bundle.enrollments,
            "events": bundle.events,
        });
        let response = self.post_json("tracker", &query_refs, &body).await?;
        Ok(TrackerImportReport::parse(&response))
    }

    async fn post_tracker_legacy(&self, bundle: &TrackerBundle) -> ClientResult<TrackerImportReport> {
        let params = [("importStrategy".to_string(), "CREATE_AND_UPDATE".to_string()), ("atomicMode".to_string(), "NONE".to_string())];
        let query_refs: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();

        let te_url = self.endpoint.url("trackedEntityInstances");
        let te_body = json!({ "trackedEntityInstances": bundle.tracked_entities });
        let te_response = self.post_json("trackedEntityInstances", &query_refs, &te_body).await?;
        let te_report = ImportReport::parse(&te_response, &te_url)?;

        let en_url = self.endpoint.url("enrollments");
        let en_body = json!({ "enrollments": bundle.enrollments });
        let en_response = self.post_json("enrollments", &query_refs, &en_body).await?;
        let en_report = ImportReport::parse(&en_response, &en_url)?;

        let ev_url = self.endpoint.url("events");
        let ev_body = json!({ "events": bundle.events });
        let ev_response = self.post_json("events", &query_refs, &ev_body).await?;
        let ev_report = ImportReport::parse(&ev_response, &ev_url)?;

        let mut conflicts = Vec::new();
        conflicts.extend(te_report.conflicts().iter().cloned());
        conflicts.extend(en_report.conflicts().iter().cloned());
        conflicts.extend(ev_report.conflicts().iter().cloned());

        Ok(TrackerImportReport {
            tracked_entity: te_report.counts(),
            enrollment: en_report.counts(),
            event: ev_report.counts(),
            conflicts,
        })
    }

    async fn get_data_value_audit_count(&self, since_iso: &str) -> ClientResult<Option<u64>> {
        let query = [
            ("startDate".to_string(), since_iso.to_string()),
            ("paging".to_string(), "true".to_string()),
            ("pageSize".to_string(), "1".to_string()),
        ];
        let query_refs: Vec<(&str, String)> = query.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        match self.get_json("dataValueAudits", &query_refs).await {
            Ok(body) => Ok(Some(
                body.get("pager")
                    .and_then(|p| p.get("total"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            )),
            Err(ClientError::ResourceNotAvailable { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
