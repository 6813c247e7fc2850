use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use http::{Request, StatusCode};
use hyper::{client::HttpConnector, Body};
use std::{
    fmt, io,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;
use url::Url;

use crate::config::StorageConfig;

const SCHEME: &str = "gs://";

/// A reference to an object in a bucket, written `gs://bucket/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub bucket: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(bucket: &str, name: &str) -> Self {
        ObjectRef {
            bucket: bucket.to_owned(),
            name: name.to_owned(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", SCHEME, self.bucket, self.name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {0} is outside the store")]
    InvalidObject(String),
    #[error("object {0} not found")]
    NotFound(ObjectRef),
    #[error("could not read {object}: {source}")]
    Io { object: ObjectRef, source: io::Error },
    #[error("invalid storage endpoint: {0}")]
    Endpoint(String),
    #[error(transparent)]
    Request(#[from] http::Error),
    #[error(transparent)]
    Http(#[from] hyper::Error),
    #[error("fetching {object} failed with {status}")]
    Status { object: ObjectRef, status: StatusCode },
}

/// Read access to a bucket store.
pub trait ObjectStore: Send + Sync {
    fn fetch<'a>(&'a self, object: &'a ObjectRef) -> BoxFuture<'a, Result<Bytes, StoreError>>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    fn fetch<'a>(&'a self, object: &'a ObjectRef) -> BoxFuture<'a, Result<Bytes, StoreError>> {
        (**self).fetch(object)
    }
}

/// Builds the store named by the configuration.
pub fn from_config(config: &StorageConfig) -> Result<Box<dyn ObjectStore>, StoreError> {
    let store: Box<dyn ObjectStore> = match config {
        StorageConfig::Local { root } => Box::new(LocalStore::new(root)),
        StorageConfig::Emulator { endpoint } => Box::new(EmulatorStore::new(endpoint)?),
    };
    Ok(store)
}

/// Buckets as directories: `gs://bucket/name` is the file `{root}/bucket/name`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalStore { root: root.into() }
    }

    fn path(&self, object: &ObjectRef) -> Result<PathBuf, StoreError> {
        let escapes = |p: &Path| {
            p.components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        };
        if escapes(Path::new(&object.bucket)) || escapes(Path::new(&object.name)) {
            return Err(StoreError::InvalidObject(object.to_string()));
        }
        Ok(self.root.join(&object.bucket).join(&object.name))
    }
}

impl ObjectStore for LocalStore {
    fn fetch<'a>(&'a self, object: &'a ObjectRef) -> BoxFuture<'a, Result<Bytes, StoreError>> {
        async move {
            let path = self.path(object)?;
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Bytes::from(bytes)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    Err(StoreError::NotFound(object.clone()))
                }
                Err(source) => Err(StoreError::Io {
                    object: object.clone(),
                    source,
                }),
            }
        }
        .boxed()
    }
}

/// A storage emulator serving the JSON API's media downloads over plain HTTP.
#[derive(Debug, Clone)]
pub struct EmulatorStore {
    endpoint: Url,
    client: hyper::Client<HttpConnector>,
}

impl EmulatorStore {
    pub fn new(endpoint: &str) -> Result<Self, StoreError> {
        let endpoint = Url::parse(endpoint).map_err(|e| StoreError::Endpoint(e.to_string()))?;
        if endpoint.cannot_be_a_base() {
            return Err(StoreError::Endpoint(endpoint.to_string()));
        }
        Ok(EmulatorStore {
            endpoint,
            client: hyper::Client::new(),
        })
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o/{name}?alt=media`, with the object
    /// name as one segment.
    pub fn media_url(&self, object: &ObjectRef) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Endpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", object.bucket.as_str(), "o", object.name.as_str()]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }
}

impl ObjectStore for EmulatorStore {
    fn fetch<'a>(&'a self, object: &'a ObjectRef) -> BoxFuture<'a, Result<Bytes, StoreError>> {
        async move {
            let url = self.media_url(object)?;
            let req = Request::get(url.as_str()).body(Body::empty())?;
            let res = self.client.request(req).await?;
            match res.status() {
                StatusCode::OK => Ok(hyper::body::to_bytes(res.into_body()).await?),
                StatusCode::NOT_FOUND => Err(StoreError::NotFound(object.clone())),
                status => Err(StoreError::Status {
                    object: object.clone(),
                    status,
                }),
            }
        }
        .boxed()
    }
}
