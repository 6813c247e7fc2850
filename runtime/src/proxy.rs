use crate::{Context, Err, Handler};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use futures::{
    future::{self, BoxFuture},
    prelude::*,
};
use http::{Method, Request, Response};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, convert::TryFrom};

/// An HTTP request forwarded by a gateway as a JSON event.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    /// `GET` when absent.
    #[serde(default)]
    pub http_method: Option<String>,
    /// `/` when absent.
    #[serde(default)]
    pub path: Option<String>,
    /// Decoded query string parameters, one value per name.
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    /// Request headers, one value per name.
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// The request body, if any.
    #[serde(default)]
    pub body: Option<String>,
    /// Whether `body` holds base64 rather than text.
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl TryFrom<ProxyRequest> for Request<Bytes> {
    type Error = Err;

    fn try_from(req: ProxyRequest) -> Result<Self, Self::Error> {
        let method = match req.http_method {
            Some(method) => Method::from_bytes(method.as_bytes())?,
            None => Method::GET,
        };

        let mut uri = req.path.unwrap_or_else(|| String::from("/"));
        if let Some(params) = req.query_string_parameters.filter(|p| !p.is_empty()) {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter())
                .finish();
            uri.push('?');
            uri.push_str(&query);
        }

        let body = match req.body {
            Some(body) if req.is_base64_encoded => Bytes::from(STANDARD.decode(body)?),
            Some(body) => Bytes::from(body),
            None => Bytes::new(),
        };

        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in req.headers.iter().flatten() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        Ok(builder.body(body)?)
    }
}

/// The JSON document a gateway turns back into an HTTP response.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    /// The HTTP status code.
    pub status_code: u16,
    /// Response headers that are valid strings.
    pub headers: HashMap<String, String>,
    /// The response body, base64 encoded when `is_base64_encoded` is set.
    pub body: String,
    /// Whether `body` holds base64 rather than text.
    pub is_base64_encoded: bool,
}

impl From<Response<String>> for ProxyResponse {
    fn from(res: Response<String>) -> Self {
        let (parts, body) = res.into_parts();
        let headers = parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_owned(), value.to_str().ok()?.to_owned()))
            })
            .collect();
        ProxyResponse {
            status_code: parts.status.as_u16(),
            headers,
            body,
            is_base64_encoded: false,
        }
    }
}

/// A handler of plain `http` requests, hosted behind a proxy event.
pub trait HttpHandler {
    /// Errors returned by this handler.
    type Err: Into<Err>;
    /// The future response value of this handler.
    type Fut: Future<Output = Result<Response<String>, Self::Err>> + Send + 'static;
    /// Process the incoming request and return the response asynchronously.
    fn call_http(&mut self, req: Request<Bytes>, ctx: Context) -> Self::Fut;
}

/// Returns a new `HttpFn` with the given closure.
pub fn http_fn<Function>(f: Function) -> HttpFn<Function> {
    HttpFn { f }
}

/// An `HttpHandler` implemented by a closure.
#[derive(Copy, Clone, Debug)]
pub struct HttpFn<Function> {
    f: Function,
}

impl<Function, Error, Fut> HttpHandler for HttpFn<Function>
where
    Function: Fn(Request<Bytes>, Context) -> Fut,
    Error: Into<Err>,
    Fut: Future<Output = Result<Response<String>, Error>> + Send + 'static,
{
    type Err = Error;
    type Fut = Fut;
    fn call_http(&mut self, req: Request<Bytes>, ctx: Context) -> Self::Fut {
        (self.f)(req, ctx)
    }
}

/// Adapts an [`HttpHandler`] to the event-level [`Handler`] trait.
#[derive(Debug)]
pub struct ProxyHandler<H> {
    inner: H,
}

impl<H> ProxyHandler<H> {
    /// Wraps `inner`.
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> Handler<ProxyRequest, ProxyResponse> for ProxyHandler<H>
where
    H: HttpHandler,
{
    type Err = Err;
    type Fut = BoxFuture<'static, Result<ProxyResponse, Err>>;

    fn call(&mut self, event: ProxyRequest, ctx: Context) -> Self::Fut {
        match Request::<Bytes>::try_from(event) {
            Ok(req) => self
                .inner
                .call_http(req, ctx)
                .map(|res| res.map(ProxyResponse::from).map_err(Into::<Err>::into))
                .boxed(),
            Err(err) => future::ready(Err(err)).boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use proptest::prelude::*;

    #[test]
    fn proxy_event_becomes_request() -> Result<(), Err> {
        let event: ProxyRequest = serde_json::from_str(
            r#"{
                "httpMethod": "POST",
                "path": "/howdoi",
                "queryStringParameters": {"question": "sort a list"},
                "headers": {"content-type": "text/plain"},
                "body": "ignored",
                "isBase64Encoded": false
            }"#,
        )?;
        let req = Request::<Bytes>::try_from(event)?;

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri().path(), "/howdoi");
        assert_eq!(req.uri().query(), Some("question=sort+a+list"));
        assert_eq!(req.headers()["content-type"], "text/plain");
        assert_eq!(req.body().as_ref(), b"ignored");
        Ok(())
    }

    #[test]
    fn sparse_event_defaults() -> Result<(), Err> {
        let req = Request::<Bytes>::try_from(ProxyRequest::default())?;
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.uri().path(), "/");
        assert!(req.body().is_empty());
        Ok(())
    }

    #[test]
    fn base64_bodies_are_decoded() -> Result<(), Err> {
        let event = ProxyRequest {
            body: Some(String::from("aG93ZG95")),
            is_base64_encoded: true,
            ..ProxyRequest::default()
        };
        let req = Request::<Bytes>::try_from(event)?;
        assert_eq!(req.body().as_ref(), b"howdoy");
        Ok(())
    }

    #[test]
    fn response_becomes_proxy_document() {
        let res = Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .header("content-type", "text/plain")
            .body(String::from("nope"))
            .unwrap();
        let res = ProxyResponse::from(res);

        assert_eq!(res.status_code, 400);
        assert_eq!(res.headers["content-type"], "text/plain");
        assert_eq!(res.body, "nope");
    }

    #[tokio::test]
    async fn proxy_handler_round_trip() -> Result<(), Err> {
        let mut handler = ProxyHandler::new(http_fn(|req: Request<Bytes>, _: Context| async move {
            let body = String::from_utf8(req.body().to_vec())?;
            Ok::<_, Err>(Response::new(body))
        }));
        let event = ProxyRequest {
            body: Some(String::from("echo")),
            ..ProxyRequest::default()
        };
        let res = handler.call(event, Context::default()).await?;

        assert_eq!(res.status_code, 200);
        assert_eq!(res.body, "echo");
        Ok(())
    }

    proptest! {
        #[test]
        fn query_parameters_survive_conversion(
            params in prop::collection::hash_map("[a-z]{1,6}", "[ -~]{0,12}", 0..5)
        ) {
            let event = ProxyRequest {
                query_string_parameters: Some(params.clone()),
                ..ProxyRequest::default()
            };
            let req = Request::<Bytes>::try_from(event).unwrap();
            let query = req.uri().query().unwrap_or("");
            let parsed: HashMap<String, String> =
                form_urlencoded::parse(query.as_bytes()).into_owned().collect();
            prop_assert_eq!(parsed, params);
        }
    }
}
