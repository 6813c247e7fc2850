//! A [`Warehouse`] speaking the v2 REST shape of BigQuery over plain HTTP, as
//! served by local emulators.
//!
//! Rows are appended with a load job: the schema and the rows go up together as
//! a multipart upload, and the job is polled until it is done. The table's
//! `numRows` is final once the job has finished.
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use hyper::{client::HttpConnector, Body};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use tracing::{debug, info};
use url::Url;

use super::warehouse::{
    FieldMode, FieldType, LoadJob, Row, SchemaField, TableId, TableInfo, Value, Warehouse,
    WarehouseError,
};

const BOUNDARY: &str = "airports_load_job";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
    table_id: &'a str,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableSchema<F> {
    fields: F,
}

/// A schema field as the service reports it. Older tables say `FLOAT64` where
/// newer ones say `FLOAT`, and an absent mode means `NULLABLE`.
#[derive(Debug, Deserialize)]
struct RemoteField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    num_rows: Option<String>,
    #[serde(default)]
    schema: Option<TableSchema<Vec<RemoteField>>>,
}

#[derive(Debug, Serialize)]
struct JobRequest<'a> {
    configuration: JobConfiguration<'a>,
}

#[derive(Debug, Serialize)]
struct JobConfiguration<'a> {
    load: LoadConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadConfiguration<'a> {
    destination_table: TableReference<'a>,
    schema: TableSchema<&'a [SchemaField]>,
    source_format: &'static str,
    write_disposition: &'static str,
    create_disposition: &'static str,
    autodetect: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    #[serde(default)]
    status: JobStatus,
    #[serde(default)]
    statistics: JobStatistics,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<ErrorMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct JobStatistics {
    #[serde(default)]
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    #[serde(default)]
    output_rows: Option<String>,
}

impl JobResource {
    fn is_done(&self) -> bool {
        self.status.state == "DONE"
    }

    fn output_rows(&self) -> Option<u64> {
        let load = self.statistics.load.as_ref()?;
        load.output_rows.as_ref()?.parse().ok()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

fn api_error(status: StatusCode, body: &[u8]) -> WarehouseError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|body| body.error.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
    WarehouseError::Api { status, message }
}

fn load_request(job: &LoadJob) -> JobRequest<'_> {
    JobRequest {
        configuration: JobConfiguration {
            load: LoadConfiguration {
                destination_table: TableReference {
                    project_id: &job.destination.project,
                    dataset_id: &job.destination.dataset,
                    table_id: &job.destination.table,
                },
                schema: TableSchema { fields: &job.schema },
                source_format: "NEWLINE_DELIMITED_JSON",
                write_disposition: "WRITE_APPEND",
                create_disposition: "CREATE_IF_NEEDED",
                autodetect: false,
            },
        },
    }
}

/// One JSON object per row, keyed by field name.
fn ndjson(schema: &[SchemaField], rows: &[Row]) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    for Row(values) in rows {
        let record: BTreeMap<&str, &Value> =
            schema.iter().map(|field| field.name.as_str()).zip(values).collect();
        serde_json::to_writer(&mut out, &record)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// The `multipart/related` body of a load job upload: job metadata, then data.
fn upload_body(job: &LoadJob, rows: &[Row]) -> Result<Vec<u8>, serde_json::Error> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    serde_json::to_writer(&mut body, &load_request(job))?;
    body.extend_from_slice(format!("\r\n--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(&ndjson(&job.schema, rows)?);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    Ok(body)
}

fn type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "STRING",
        FieldType::Float => "FLOAT",
    }
}

fn mode_name(mode: FieldMode) -> &'static str {
    match mode {
        FieldMode::Required => "REQUIRED",
        FieldMode::Nullable => "NULLABLE",
    }
}

fn same_schema(expected: &[SchemaField], remote: &[RemoteField]) -> bool {
    let same_field = |field: &SchemaField, remote: &RemoteField| {
        let remote_type = remote.field_type.to_ascii_uppercase();
        let remote_type = match remote_type.as_str() {
            "FLOAT64" => "FLOAT",
            other => other,
        };
        let remote_mode = remote.mode.as_deref().unwrap_or("NULLABLE");
        field.name.eq_ignore_ascii_case(&remote.name)
            && type_name(field.field_type) == remote_type
            && mode_name(field.mode).eq_ignore_ascii_case(remote_mode)
    };
    expected.len() == remote.len()
        && expected.iter().zip(remote).all(|(field, remote)| same_field(field, remote))
}

fn table_info(id: &TableId, resource: TableResource) -> TableInfo {
    TableInfo {
        full_table_id: resource.id.unwrap_or_else(|| id.full_table_id()),
        num_rows: resource
            .num_rows
            .and_then(|rows| rows.parse().ok())
            .unwrap_or_default(),
    }
}

#[derive(Debug, Clone)]
pub struct RestWarehouse {
    endpoint: Url,
    client: hyper::Client<HttpConnector>,
    poll_interval: Duration,
}

impl RestWarehouse {
    pub fn new(endpoint: &str) -> Result<Self, WarehouseError> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| WarehouseError::Endpoint(e.to_string()))?;
        if endpoint.cannot_be_a_base() {
            return Err(WarehouseError::Endpoint(endpoint.to_string()));
        }
        Ok(RestWarehouse {
            endpoint,
            client: hyper::Client::new(),
            poll_interval: Duration::from_millis(500),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, WarehouseError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| WarehouseError::Endpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn table_url(&self, id: &TableId) -> Result<Url, WarehouseError> {
        self.url(&[
            "bigquery",
            "v2",
            "projects",
            id.project.as_str(),
            "datasets",
            id.dataset.as_str(),
            "tables",
            id.table.as_str(),
        ])
    }

    /// Where load jobs with their data are posted.
    pub fn upload_url(&self, project: &str) -> Result<Url, WarehouseError> {
        let mut url = self.url(&["upload", "bigquery", "v2", "projects", project, "jobs"])?;
        url.query_pairs_mut().append_pair("uploadType", "multipart");
        Ok(url)
    }

    pub fn job_url(
        &self,
        project: &str,
        job_id: &str,
        location: Option<&str>,
    ) -> Result<Url, WarehouseError> {
        let mut url = self.url(&["bigquery", "v2", "projects", project, "jobs", job_id])?;
        if let Some(location) = location {
            url.query_pairs_mut().append_pair("location", location);
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<(String, Vec<u8>)>,
    ) -> Result<(StatusCode, Bytes), WarehouseError> {
        debug!(%method, %url, "warehouse request");
        let mut builder = Request::builder().method(method).uri(url.as_str());
        let body = match body {
            Some((content_type, body)) => {
                builder = builder.header(CONTENT_TYPE, content_type);
                Body::from(body)
            }
            None => Body::empty(),
        };
        let res = self.client.request(builder.body(body)?).await?;
        let status = res.status();
        let bytes = hyper::body::to_bytes(res.into_body()).await?;
        Ok((status, bytes))
    }

    async fn fetch_table(&self, id: &TableId) -> Result<Option<TableResource>, WarehouseError> {
        let (status, body) = self.send(Method::GET, self.table_url(id)?, None).await?;
        match status {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(serde_json::from_slice(&body)?)),
            status => Err(api_error(status, &body)),
        }
    }

    async fn fetch_job(
        &self,
        project: &str,
        reference: &JobReference,
    ) -> Result<JobResource, WarehouseError> {
        let url = self.job_url(project, &reference.job_id, reference.location.as_deref())?;
        let (status, body) = self.send(Method::GET, url, None).await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn run_load(&self, job: &LoadJob, rows: &[Row]) -> Result<JobResource, WarehouseError> {
        let project = job.destination.project.as_str();
        let content_type = format!("multipart/related; boundary={}", BOUNDARY);
        let (status, body) = self
            .send(
                Method::POST,
                self.upload_url(project)?,
                Some((content_type, upload_body(job, rows)?)),
            )
            .await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let mut resource: JobResource = serde_json::from_slice(&body)?;
        info!(job = %resource.job_reference.job_id, "load job submitted");
        while !resource.is_done() {
            tokio::time::sleep(self.poll_interval).await;
            resource = self.fetch_job(project, &resource.job_reference).await?;
            debug!(
                job = %resource.job_reference.job_id,
                state = %resource.status.state,
                "load job polled"
            );
        }
        Ok(resource)
    }
}

impl Warehouse for RestWarehouse {
    fn append<'a>(
        &'a self,
        job: &'a LoadJob,
        rows: Vec<Row>,
    ) -> BoxFuture<'a, Result<u64, WarehouseError>> {
        async move {
            if let Some(TableResource {
                schema: Some(TableSchema { fields }),
                ..
            }) = self.fetch_table(&job.destination).await?
            {
                if !same_schema(&job.schema, &fields) {
                    return Err(WarehouseError::SchemaMismatch(job.destination.clone()));
                }
            }
            if rows.is_empty() {
                return Ok(0);
            }

            let resource = self.run_load(job, &rows).await?;
            if let Some(failure) = &resource.status.error_result {
                return Err(WarehouseError::Job {
                    job: resource.job_reference.job_id.clone(),
                    message: failure.message.clone(),
                });
            }
            Ok(resource.output_rows().unwrap_or(rows.len() as u64))
        }
        .boxed()
    }

    fn table<'a>(&'a self, id: &'a TableId) -> BoxFuture<'a, Result<TableInfo, WarehouseError>> {
        async move {
            match self.fetch_table(id).await? {
                Some(resource) => Ok(table_info(id, resource)),
                None => Err(WarehouseError::NotFound(id.clone())),
            }
        }
        .boxed()
    }
}
