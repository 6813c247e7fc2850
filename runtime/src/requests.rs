use crate::{error_hook::ErrorReport, Err};
use bytes::Bytes;
use http::{header::CONTENT_TYPE, uri::PathAndQuery, Method, Request, Uri};
use std::convert::TryFrom;

/// Represents a request that retrieves an invocation event. The response body contains
/// the payload from the invocation, which is a JSON document that contains event data
/// from the function trigger. The response headers contain additional data about the invocation.
///
/// ```
/// use bytes::Bytes;
/// use http::Request;
/// use functions_runtime::requests::NextEventRequest;
///
/// let req = Request::<Bytes>::try_from(NextEventRequest)?;
/// assert_eq!(req.uri().path(), "/2018-06-01/runtime/invocation/next");
/// # Ok::<(), http::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextEventRequest;

impl TryFrom<NextEventRequest> for Request<Bytes> {
    type Error = http::Error;

    fn try_from(_: NextEventRequest) -> Result<Self, Self::Error> {
        Request::builder()
            .method(Method::GET)
            .uri(Uri::from_static("/2018-06-01/runtime/invocation/next"))
            .body(Bytes::new())
    }
}

/// A request that returns a successful response to the host.
///
/// ```
/// use bytes::Bytes;
/// use http::Request;
/// use functions_runtime::requests::EventCompletionRequest;
///
/// let req = EventCompletionRequest::new("123", Bytes::from("bye!"))?;
/// let req = Request::<Bytes>::try_from(req)?;
/// assert_eq!(req.uri().path(), "/2018-06-01/runtime/invocation/123/response");
/// # Ok::<(), functions_runtime::Err>(())
/// ```
#[derive(Debug)]
pub struct EventCompletionRequest {
    path_and_query: PathAndQuery,
    body: Bytes,
}

impl EventCompletionRequest {
    /// Fallibly constructs an `EventCompletionRequest`.
    pub fn new(request_id: &str, body: Bytes) -> Result<Self, Err> {
        let path = format!("/2018-06-01/runtime/invocation/{}/response", request_id);
        let path_and_query = path.parse::<PathAndQuery>()?;
        Ok(Self { path_and_query, body })
    }
}

impl TryFrom<EventCompletionRequest> for Request<Bytes> {
    type Error = http::Error;

    fn try_from(req: EventCompletionRequest) -> Result<Self, Self::Error> {
        let uri = Uri::builder().path_and_query(req.path_and_query).build()?;
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(req.body)
    }
}

/// A request that reports a failed invocation to the host.
#[derive(Debug)]
pub struct EventErrorRequest {
    path_and_query: PathAndQuery,
    report: ErrorReport,
}

impl EventErrorRequest {
    /// Fallibly constructs an `EventErrorRequest`.
    pub fn new(request_id: &str, report: ErrorReport) -> Result<Self, Err> {
        let path = format!("/2018-06-01/runtime/invocation/{}/error", request_id);
        let path_and_query = path.parse::<PathAndQuery>()?;
        Ok(Self { path_and_query, report })
    }
}

impl TryFrom<EventErrorRequest> for Request<Bytes> {
    type Error = Err;

    fn try_from(req: EventErrorRequest) -> Result<Self, Self::Error> {
        let uri = Uri::builder().path_and_query(req.path_and_query).build()?;
        let body = serde_json::to_vec(&req.report)?;
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .header("lambda-runtime-function-error-type", "Unhandled")
            .body(Bytes::from(body))?;
        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_request_carries_report() -> Result<(), Err> {
        let report = ErrorReport {
            name: String::from("UnknownError"),
            err: String::from("boom"),
        };
        let req = Request::<Bytes>::try_from(EventErrorRequest::new("42", report)?)?;

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri().path(), "/2018-06-01/runtime/invocation/42/error");
        assert_eq!(req.headers()["lambda-runtime-function-error-type"], "Unhandled");
        assert_eq!(
            req.body().as_ref(),
            br#"{"errorType":"UnknownError","errorMessage":"boom"}"#
        );
        Ok(())
    }

    #[test]
    fn request_ids_must_form_a_path() {
        assert!(EventCompletionRequest::new("has space", Bytes::new()).is_err());
    }
}
