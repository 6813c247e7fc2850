#![deny(clippy::all)]
#![warn(missing_docs, nonstandard_style, rust_2018_idioms)]

//! A small runtime for serverless functions. Functions written in Rust are
//! executable binaries that include this runtime as a dependency; the runtime
//! polls the host's Runtime API for events, hands each one to a [`Handler`],
//! and posts the result (or an error report) back.
//!
//! ```no_run
//! use functions_runtime::{handler_fn, Context, Err};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Err> {
//!     functions_runtime::run(handler_fn(echo)).await
//! }
//!
//! async fn echo(event: String, _: Context) -> Result<String, Err> {
//!     Ok(event)
//! }
//! ```
use bytes::Bytes;
use futures::prelude::*;
use http::{
    uri::{Authority, Scheme},
    Request, Response, Uri,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::convert::{TryFrom, TryInto};
use tracing::{error, info, info_span, Instrument};

use crate::client::{Client, EventClient, EventStream};
use crate::error_hook::{default_error_hook, ErrorHook};
use crate::requests::{EventCompletionRequest, EventErrorRequest};
pub use crate::proxy::{http_fn, HttpFn, HttpHandler, ProxyHandler, ProxyRequest, ProxyResponse};
pub use crate::types::Context;

mod client;
/// Mechanism to provide a custom error reporting hook.
pub mod error_hook;
/// Conversion between proxy events and `http` types.
pub mod proxy;
/// Requests sent to the Runtime API.
pub mod requests;
/// Types available to a function.
mod types;

/// The boxed error type used throughout the runtime.
pub type Err = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug)]
/// A string error, which can be displayed.
pub struct StringError(pub String);

impl std::error::Error for StringError {}

impl std::fmt::Display for StringError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        self.0.fmt(f)
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! err_fmt {
    {$($t:tt)*} => {
        $crate::StringError(format!($($t)*))
    }
}

/// A struct containing configuration values derived from environment variables.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Config {
    /// The host and port of the Runtime API.
    #[serde(rename = "AWS_LAMBDA_RUNTIME_API")]
    pub endpoint: String,
    /// The name of the function.
    #[serde(rename = "AWS_LAMBDA_FUNCTION_NAME")]
    pub function_name: String,
    /// The amount of memory available to the function in MB.
    #[serde(rename = "AWS_LAMBDA_FUNCTION_MEMORY_SIZE")]
    pub memory: i32,
    /// The version of the function being executed.
    #[serde(rename = "AWS_LAMBDA_FUNCTION_VERSION")]
    pub version: String,
    /// The name of the log stream for the function.
    #[serde(rename = "AWS_LAMBDA_LOG_STREAM_NAME")]
    pub log_stream: String,
    /// The name of the log group for the function.
    #[serde(rename = "AWS_LAMBDA_LOG_GROUP_NAME")]
    pub log_group: String,
}

impl Config {
    /// Attempts to read configuration from environment variables.
    pub fn from_env() -> Result<Self, Err> {
        let conf = envy::from_env::<Config>()?;
        Ok(conf)
    }

    /// Splits the endpoint into the scheme and authority every request is sent to.
    /// The host exports the endpoint as a bare `host:port`, in which case `http` is assumed.
    pub fn origin(&self) -> Result<(Scheme, Authority), Err> {
        let endpoint = if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            format!("http://{}", self.endpoint)
        };
        let parts = endpoint.parse::<Uri>()?.into_parts();
        let scheme = parts.scheme.ok_or_else(|| err_fmt!("scheme not found"))?;
        let authority = parts.authority.ok_or_else(|| err_fmt!("authority not found"))?;
        Ok((scheme, authority))
    }
}

/// A trait describing an asynchronous function from `Event` to `Output`.
/// `Event` and `Output` must implement [`Deserialize`](serde::Deserialize) and
/// [`Serialize`](serde::Serialize).
pub trait Handler<Event, Output> {
    /// Errors returned by this handler.
    type Err: Into<Err>;
    /// The future response value of this handler.
    type Fut: Future<Output = Result<Output, Self::Err>> + Send;
    /// Process the incoming event and return the response asynchronously.
    fn call(&mut self, event: Event, ctx: Context) -> Self::Fut;
}

/// Returns a new `HandlerFn` with the given closure.
pub fn handler_fn<Function>(f: Function) -> HandlerFn<Function> {
    HandlerFn { f }
}

/// A `Handler` implemented by a closure.
#[derive(Copy, Clone, Debug)]
pub struct HandlerFn<Function> {
    f: Function,
}

impl<Function, Event, Output, Error, Fut> Handler<Event, Output> for HandlerFn<Function>
where
    Function: Fn(Event, Context) -> Fut,
    Error: Into<Err>,
    Fut: Future<Output = Result<Output, Error>> + Send,
{
    type Err = Error;
    type Fut = Fut;
    fn call(&mut self, event: Event, ctx: Context) -> Self::Fut {
        (self.f)(event, ctx)
    }
}

/// Starts the runtime and begins polling for events on the Runtime API.
/// Handler errors are reported with [`default_error_hook`].
///
/// # Arguments
/// * `handler` - A function or closure that conforms to the `Handler` trait
pub async fn run<Function, Event, Output>(handler: Function) -> Result<(), Err>
where
    Function: Handler<Event, Output>,
    Event: DeserializeOwned,
    Output: Serialize,
{
    run_with_error_hook(handler, default_error_hook).await
}

/// Like [`run`], but handler errors are turned into reports by `hook`.
pub async fn run_with_error_hook<Function, Event, Output>(
    mut handler: Function,
    hook: ErrorHook,
) -> Result<(), Err>
where
    Function: Handler<Event, Output>,
    Event: DeserializeOwned,
    Output: Serialize,
{
    let config = Config::from_env()?;
    let (scheme, authority) = config.origin()?;
    let client = Client::new(scheme, authority);
    info!(function = %config.function_name, version = %config.version, "runtime started");
    drive(&client, &config, &mut handler, hook).await
}

/// Starts the runtime with a handler for proxied HTTP requests.
pub async fn run_http<H>(handler: H) -> Result<(), Err>
where
    H: HttpHandler,
{
    run(ProxyHandler::new(handler)).await
}

async fn drive<C, Function, Event, Output>(
    client: &C,
    config: &Config,
    handler: &mut Function,
    hook: ErrorHook,
) -> Result<(), Err>
where
    C: EventClient,
    Function: Handler<Event, Output>,
    Event: DeserializeOwned,
    Output: Serialize,
{
    let mut stream = EventStream::new(client);
    while let Some(event) = stream.next().await {
        invoke(client, config, handler, hook, event?).await?;
    }
    Ok(())
}

/// Runs a single event through `handler` and posts the outcome. A handler that
/// fails (or an event that doesn't deserialize) is reported on the error endpoint;
/// only transport failures are returned.
async fn invoke<C, Function, Event, Output>(
    client: &C,
    config: &Config,
    handler: &mut Function,
    hook: ErrorHook,
    event: Response<Bytes>,
) -> Result<(), Err>
where
    C: EventClient,
    Function: Handler<Event, Output>,
    Event: DeserializeOwned,
    Output: Serialize,
{
    let (parts, body) = event.into_parts();
    let mut ctx = Context::try_from(&parts.headers)?;
    ctx.env_config = config.clone();
    let request_id = ctx.request_id.clone();
    let span = info_span!("invocation", request_id = %request_id);

    let outcome = async {
        let event: Event = serde_json::from_slice(&body)?;
        let output = handler.call(event, ctx).await.map_err(Into::<Err>::into)?;
        Ok::<_, Err>(serde_json::to_vec(&output)?)
    }
    .instrument(span.clone())
    .await;

    let req: Request<Bytes> = match outcome {
        Ok(body) => EventCompletionRequest::new(&request_id, Bytes::from(body))?.try_into()?,
        Err(err) => {
            span.in_scope(|| error!(error = %err, "invocation failed"));
            EventErrorRequest::new(&request_id, hook(&err))?.try_into()?
        }
    };
    client.call(req).await?;
    Ok(())
}
