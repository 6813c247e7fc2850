//! The answer lookup function: takes a programming question from an HTTP request
//! and replies with the answer as plain text.
use bytes::Bytes;
use chrono::Local;
use headers::{ContentType, HeaderMapExt};
use http::{
    header::{HeaderName, HeaderValue, CONTENT_TYPE},
    Request, Response, StatusCode,
};
use mime::Mime;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

mod lookup;

pub use lookup::{AnswerLookup, HowdoiCommand, LookupError};

/// Name of the query parameter, JSON field and form field holding the question.
pub const QUESTION_PARAM: &str = "question";
pub const PLACEHOLDER_ANSWER: &str = "You forgot to provide a question!";
pub const SERVER_TIME: &str = "server-time";

/// What to do with a request that carries no question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingQuestion {
    /// Reply `200` with [`PLACEHOLDER_ANSWER`].
    #[default]
    Placeholder,
    /// Reply `400` naming the content type that was sent.
    Reject,
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("no question found for content type {}", content_type.as_deref().unwrap_or("<none>"))]
    InvalidRequest { content_type: Option<String> },
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Where the question of a request was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionRequest {
    Query(String),
    Json(String),
    Form(String),
    Text(String),
    Missing { content_type: Option<String> },
}

impl QuestionRequest {
    /// Resolves the question of `req`. The query string wins; otherwise the body is
    /// read according to the declared content type. Empty questions count as missing.
    pub fn from_request(req: &Request<Bytes>) -> Self {
        if let Some(question) = req.uri().query().and_then(|q| form_field(q.as_bytes())) {
            return QuestionRequest::Query(question);
        }

        let mime = req.headers().typed_get::<ContentType>().map(Mime::from);
        let body = req.body();
        let resolved = match mime.as_ref().map(Mime::essence_str) {
            Some("application/json") => json_field(body).map(QuestionRequest::Json),
            Some("application/x-www-form-urlencoded") => {
                form_field(body).map(QuestionRequest::Form)
            }
            Some("text/plain") | Some("application/octet-stream") => {
                text(body).map(QuestionRequest::Text)
            }
            _ => None,
        };

        resolved.unwrap_or_else(|| QuestionRequest::Missing {
            content_type: req
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned),
        })
    }

    pub fn question(&self) -> Option<&str> {
        match self {
            QuestionRequest::Query(q)
            | QuestionRequest::Json(q)
            | QuestionRequest::Form(q)
            | QuestionRequest::Text(q) => Some(q),
            QuestionRequest::Missing { .. } => None,
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn form_field(input: &[u8]) -> Option<String> {
    form_urlencoded::parse(input)
        .find(|(key, _)| key == QUESTION_PARAM)
        .and_then(|(_, value)| non_empty(value.into_owned()))
}

fn json_field(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let question = value.get(QUESTION_PARAM)?.as_str()?;
    non_empty(question.to_owned())
}

fn text(body: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(body).ok()?;
    non_empty(text.to_owned())
}

/// The current local time, e.g. `2024-03-01 17:02:11.482913`.
fn server_time() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// A `text/plain` response stamped with the `server-time` header.
pub fn text_response(status: StatusCode, body: String) -> Response<String> {
    let mut res = Response::new(body);
    *res.status_mut() = status;
    let headers = res.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    if let Ok(now) = HeaderValue::from_str(&server_time()) {
        headers.insert(HeaderName::from_static(SERVER_TIME), now);
    }
    res
}

/// The answer function, generic over the lookup it delegates to.
#[derive(Debug, Clone)]
pub struct AnswerFunction<L> {
    lookup: L,
    missing: MissingQuestion,
}

impl<L> AnswerFunction<L>
where
    L: AnswerLookup,
{
    pub fn new(lookup: L, missing: MissingQuestion) -> Self {
        AnswerFunction { lookup, missing }
    }

    pub async fn answer(&self, request: &QuestionRequest) -> Result<String, AnswerError> {
        let content_type = match request {
            QuestionRequest::Query(question)
            | QuestionRequest::Json(question)
            | QuestionRequest::Form(question)
            | QuestionRequest::Text(question) => {
                info!(%question, "new question");
                return Ok(self.lookup.lookup(question).await?);
            }
            QuestionRequest::Missing { content_type } => content_type,
        };
        match self.missing {
            MissingQuestion::Placeholder => {
                info!("new question without a question");
                Ok(PLACEHOLDER_ANSWER.to_owned())
            }
            MissingQuestion::Reject => Err(AnswerError::InvalidRequest {
                content_type: content_type.clone(),
            }),
        }
    }

    /// Answers `req`. A rejected request becomes a `400` response; lookup
    /// failures are returned to the runtime.
    pub async fn handle(&self, req: Request<Bytes>) -> Result<Response<String>, AnswerError> {
        let request = QuestionRequest::from_request(&req);
        match self.answer(&request).await {
            Ok(answer) => Ok(text_response(StatusCode::OK, answer)),
            Err(err @ AnswerError::InvalidRequest { .. }) => {
                warn!(error = %err, "rejected request");
                Ok(text_response(StatusCode::BAD_REQUEST, err.to_string()))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{self, BoxFuture, FutureExt};
    use proptest::prelude::*;

    struct Echo;

    impl AnswerLookup for Echo {
        fn lookup<'a>(&'a self, question: &'a str) -> BoxFuture<'a, Result<String, LookupError>> {
            future::ready(Ok(format!("answer to {}", question))).boxed()
        }
    }

    fn request(uri: &str, content_type: Option<&str>, body: &str) -> Request<Bytes> {
        let mut builder = Request::builder().uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        builder.body(Bytes::from(body.to_owned())).unwrap()
    }

    #[test]
    fn query_parameter_wins() {
        let req = request(
            "/?question=sort+a+list",
            Some("application/json"),
            r#"{"question":"other"}"#,
        );
        assert_eq!(
            QuestionRequest::from_request(&req),
            QuestionRequest::Query(String::from("sort a list"))
        );
    }

    #[test]
    fn json_body() {
        let req = request("/", Some("application/json"), r#"{"question": "how to sort a list"}"#);
        assert_eq!(
            QuestionRequest::from_request(&req),
            QuestionRequest::Json(String::from("how to sort a list"))
        );
    }

    #[test]
    fn content_type_parameters_are_ignored() {
        let req = request("/", Some("application/json; charset=utf-8"), r#"{"question": "q"}"#);
        assert_eq!(QuestionRequest::from_request(&req).question(), Some("q"));
    }

    #[test]
    fn form_body() {
        let req = request(
            "/",
            Some("application/x-www-form-urlencoded"),
            "lang=rust&question=reverse+a+string",
        );
        assert_eq!(
            QuestionRequest::from_request(&req),
            QuestionRequest::Form(String::from("reverse a string"))
        );
    }

    #[test]
    fn text_and_octet_stream_bodies() {
        for content_type in ["text/plain", "application/octet-stream"] {
            let req = request("/", Some(content_type), "read a file");
            assert_eq!(
                QuestionRequest::from_request(&req),
                QuestionRequest::Text(String::from("read a file"))
            );
        }
    }

    #[test]
    fn unsupported_content_type_is_missing() {
        let req = request("/", Some("image/png"), "\u{1}");
        assert_eq!(
            QuestionRequest::from_request(&req),
            QuestionRequest::Missing {
                content_type: Some(String::from("image/png"))
            }
        );
    }

    #[test]
    fn json_without_question_is_missing() {
        let req = request("/", Some("application/json"), r#"{"question": 7}"#);
        assert_eq!(QuestionRequest::from_request(&req).question(), None);
        let req = request("/?question=", None, "");
        assert_eq!(
            QuestionRequest::from_request(&req),
            QuestionRequest::Missing { content_type: None }
        );
    }

    #[tokio::test]
    async fn answers_with_text_and_server_time() -> Result<(), AnswerError> {
        let function = AnswerFunction::new(Echo, MissingQuestion::Placeholder);
        let res = function.handle(request("/?question=exit+vim", None, "")).await?;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[CONTENT_TYPE], "text/plain");
        assert!(res.headers().contains_key(SERVER_TIME));
        assert_eq!(res.body(), "answer to exit vim");
        Ok(())
    }

    #[tokio::test]
    async fn placeholder_policy() -> Result<(), AnswerError> {
        let function = AnswerFunction::new(Echo, MissingQuestion::Placeholder);
        let res = function.handle(request("/", Some("image/png"), "")).await?;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), PLACEHOLDER_ANSWER);
        Ok(())
    }

    #[tokio::test]
    async fn reject_policy() -> Result<(), AnswerError> {
        let function = AnswerFunction::new(Echo, MissingQuestion::Reject);
        let missing = QuestionRequest::Missing {
            content_type: Some(String::from("image/png")),
        };
        let err = function.answer(&missing).await.unwrap_err();
        assert!(matches!(
            err,
            AnswerError::InvalidRequest { content_type: Some(ref ct) } if ct == "image/png"
        ));

        let res = function.handle(request("/", Some("image/png"), "")).await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()[CONTENT_TYPE], "text/plain");
        assert!(res.body().contains("image/png"));
        Ok(())
    }

    proptest! {
        #[test]
        fn every_source_yields_the_literal_question(
            question in "[a-zA-Z0-9?.,'_-][a-zA-Z0-9 ?.,'_-]{0,40}"
        ) {
            let query: String = form_urlencoded::Serializer::new(String::new())
                .append_pair(QUESTION_PARAM, &question)
                .finish();
            let json = serde_json::json!({ QUESTION_PARAM: question }).to_string();

            let requests = [
                request(&format!("/?{}", query), None, ""),
                request("/", Some("application/json"), &json),
                request("/", Some("application/x-www-form-urlencoded"), &query),
                request("/", Some("text/plain"), &question),
            ];
            for req in &requests {
                let resolved = QuestionRequest::from_request(req);
                prop_assert_eq!(resolved.question(), Some(question.as_str()));
            }
        }
    }
}
