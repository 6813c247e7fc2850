use futures::future::{self, BoxFuture, FutureExt};
use http::StatusCode;
use serde::{Deserialize, Serialize, Serializer};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};
use thiserror::Error;

use super::rows::RowCollection;
use crate::config::WarehouseConfig;

/// A fully qualified table name, written `project.dataset.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableId {
    pub fn new(project: &str, dataset: &str, table: &str) -> Self {
        TableId {
            project: project.to_owned(),
            dataset: dataset.to_owned(),
            table: table.to_owned(),
        }
    }

    /// The `project:dataset.table` form warehouses report back.
    pub fn full_table_id(&self) -> String {
        format!("{}:{}.{}", self.project, self.dataset, self.table)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Required,
    Nullable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mode: FieldMode,
}

impl SchemaField {
    pub fn required(name: &str, field_type: FieldType) -> Self {
        SchemaField {
            name: name.to_owned(),
            field_type,
            mode: FieldMode::Required,
        }
    }

    pub fn nullable(name: &str, field_type: FieldType) -> Self {
        SchemaField {
            name: name.to_owned(),
            field_type,
            mode: FieldMode::Nullable,
        }
    }
}

/// The schema the airports table is created with.
pub fn airports_schema() -> Vec<SchemaField> {
    vec![
        SchemaField::required("iata", FieldType::String),
        SchemaField::required("name", FieldType::String),
        SchemaField::nullable("city", FieldType::String),
        SchemaField::nullable("state", FieldType::String),
        SchemaField::nullable("country", FieldType::String),
        SchemaField::nullable("lat", FieldType::Float),
        SchemaField::nullable("lng", FieldType::Float),
        SchemaField::nullable("dst", FieldType::String),
        SchemaField::nullable("tz", FieldType::String),
        SchemaField::nullable("utc_offset", FieldType::Float),
    ]
}

/// A typed cell, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Float(f64),
    Null,
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Null => serializer.serialize_none(),
        }
    }
}

/// One record, with a value per field of the job's schema, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<Value>);

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("column `{0}` is not part of the table schema")]
    UnknownColumn(String),
    #[error("column `{0}` appears more than once")]
    DuplicateColumn(String),
    #[error("row {row}: required field `{field}` is empty")]
    MissingRequired { row: usize, field: String },
    #[error("row {row}: `{value}` is not a valid {field}")]
    InvalidFloat { row: usize, field: String, value: String },
}

/// Rows are appended to `destination`, which is created with `schema` if it
/// doesn't exist. Tables are never truncated.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadJob {
    pub destination: TableId,
    pub schema: Vec<SchemaField>,
}

impl LoadJob {
    pub fn append(destination: TableId, schema: Vec<SchemaField>) -> Self {
        LoadJob {
            destination,
            schema,
        }
    }

    /// Converts `rows` into typed records of this job's schema. Columns are
    /// matched by name; schema fields without a column are null.
    pub fn prepare(&self, rows: &RowCollection) -> Result<Vec<Row>, SchemaError> {
        let mut sources = vec![None; self.schema.len()];
        for (index, column) in rows.columns().iter().enumerate() {
            let field = self
                .schema
                .iter()
                .position(|field| &field.name == column)
                .ok_or_else(|| SchemaError::UnknownColumn(column.clone()))?;
            if sources[field].replace(index).is_some() {
                return Err(SchemaError::DuplicateColumn(column.clone()));
            }
        }

        rows.rows()
            .enumerate()
            .map(|(row, cells)| {
                self.schema
                    .iter()
                    .zip(&sources)
                    .map(|(field, source)| {
                        let cell = source.and_then(|index| cells[index].as_deref());
                        convert(row, field, cell)
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Row)
            })
            .collect()
    }
}

fn convert(row: usize, field: &SchemaField, cell: Option<&str>) -> Result<Value, SchemaError> {
    match (cell, field.mode, field.field_type) {
        (None, FieldMode::Required, _) => Err(SchemaError::MissingRequired {
            row,
            field: field.name.clone(),
        }),
        (None, FieldMode::Nullable, _) => Ok(Value::Null),
        (Some(text), _, FieldType::String) => Ok(Value::String(text.to_owned())),
        (Some(text), _, FieldType::Float) => {
            text.trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| SchemaError::InvalidFloat {
                    row,
                    field: field.name.clone(),
                    value: text.to_owned(),
                })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub full_table_id: String,
    pub num_rows: u64,
}

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("table {0} not found")]
    NotFound(TableId),
    #[error("table {0} exists with a different schema")]
    SchemaMismatch(TableId),
    #[error("invalid warehouse endpoint: {0}")]
    Endpoint(String),
    #[error(transparent)]
    Request(#[from] http::Error),
    #[error(transparent)]
    Http(#[from] hyper::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("warehouse replied {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("load job {job} failed: {message}")]
    Job { job: String, message: String },
}

/// An analytical store rows are appended to.
pub trait Warehouse: Send + Sync {
    /// Writes `rows` per `job`; returns how many were written.
    fn append<'a>(
        &'a self,
        job: &'a LoadJob,
        rows: Vec<Row>,
    ) -> BoxFuture<'a, Result<u64, WarehouseError>>;
    fn table<'a>(&'a self, id: &'a TableId) -> BoxFuture<'a, Result<TableInfo, WarehouseError>>;
}

impl<T: Warehouse + ?Sized> Warehouse for Box<T> {
    fn append<'a>(
        &'a self,
        job: &'a LoadJob,
        rows: Vec<Row>,
    ) -> BoxFuture<'a, Result<u64, WarehouseError>> {
        (**self).append(job, rows)
    }

    fn table<'a>(&'a self, id: &'a TableId) -> BoxFuture<'a, Result<TableInfo, WarehouseError>> {
        (**self).table(id)
    }
}

/// Builds the warehouse named by the configuration.
pub fn from_config(config: &WarehouseConfig) -> Result<Box<dyn Warehouse>, WarehouseError> {
    let warehouse: Box<dyn Warehouse> = match config {
        WarehouseConfig::Memory => Box::new(MemoryWarehouse::new()),
        WarehouseConfig::Rest { endpoint } => {
            Box::new(super::bigquery::RestWarehouse::new(endpoint)?)
        }
    };
    Ok(warehouse)
}

#[derive(Debug)]
struct MemoryTable {
    schema: Vec<SchemaField>,
    rows: Vec<Row>,
}

/// Tables kept in process memory. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    tables: Arc<Mutex<HashMap<TableId, MemoryTable>>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the rows of `id`.
    pub fn rows(&self, id: &TableId) -> Option<Vec<Row>> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.get(id).map(|table| table.rows.clone())
    }

    fn write(&self, job: &LoadJob, rows: Vec<Row>) -> Result<u64, WarehouseError> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let written = rows.len() as u64;
        match tables.get_mut(&job.destination) {
            Some(table) => {
                if table.schema != job.schema {
                    return Err(WarehouseError::SchemaMismatch(job.destination.clone()));
                }
                table.rows.extend(rows);
            }
            None => {
                tables.insert(
                    job.destination.clone(),
                    MemoryTable {
                        schema: job.schema.clone(),
                        rows,
                    },
                );
            }
        }
        Ok(written)
    }
}

impl Warehouse for MemoryWarehouse {
    fn append<'a>(
        &'a self,
        job: &'a LoadJob,
        rows: Vec<Row>,
    ) -> BoxFuture<'a, Result<u64, WarehouseError>> {
        future::ready(self.write(job, rows)).boxed()
    }

    fn table<'a>(&'a self, id: &'a TableId) -> BoxFuture<'a, Result<TableInfo, WarehouseError>> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let info = match tables.get(id) {
            Some(table) => Ok(TableInfo {
                full_table_id: id.full_table_id(),
                num_rows: table.rows.len() as u64,
            }),
            None => Err(WarehouseError::NotFound(id.clone())),
        };
        future::ready(info).boxed()
    }
}
