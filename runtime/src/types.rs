use crate::{Config, Err};
use http::HeaderMap;
use std::{
    convert::TryFrom,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// The invocation context, built from the headers of a next-event response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    /// The request ID, which identifies the request that triggered the function invocation.
    pub request_id: String,
    /// The date that the function times out, in Unix time milliseconds.
    pub deadline: u64,
    /// The ARN (or equivalent identifier) of the invoked function.
    pub invoked_function_arn: String,
    /// The tracing header, when the host propagates one.
    pub trace_id: Option<String>,
    /// Configuration of the function, read from the environment at start-up.
    pub env_config: Config,
}

impl Context {
    /// The instant this invocation times out.
    pub fn deadline(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.deadline)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, Err> {
    match headers.get(name) {
        Some(value) => Ok(Some(value.to_str()?)),
        None => Ok(None),
    }
}

impl TryFrom<&HeaderMap> for Context {
    type Error = Err;

    fn try_from(headers: &HeaderMap) -> Result<Self, Self::Error> {
        let request_id = header(headers, "lambda-runtime-aws-request-id")?
            .ok_or_else(|| crate::err_fmt!("request id header not found"))?
            .to_owned();
        let deadline = match header(headers, "lambda-runtime-deadline-ms")? {
            Some(ms) => ms.parse::<u64>()?,
            None => 0,
        };
        let ctx = Context {
            request_id,
            deadline,
            invoked_function_arn: header(headers, "lambda-runtime-invoked-function-arn")?
                .unwrap_or_default()
                .to_owned(),
            trace_id: header(headers, "lambda-runtime-trace-id")?.map(str::to_owned),
            env_config: Config::default(),
        };
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn parses_runtime_headers() -> Result<(), Err> {
        let mut headers = HeaderMap::new();
        headers.insert("lambda-runtime-aws-request-id", HeaderValue::from_static("8476a536"));
        headers.insert("lambda-runtime-deadline-ms", HeaderValue::from_static("1542409706888"));
        headers.insert(
            "lambda-runtime-invoked-function-arn",
            HeaderValue::from_static("arn:aws:lambda:us-east-2:123456789012:function:howdoi"),
        );
        let ctx = Context::try_from(&headers)?;

        assert_eq!(ctx.request_id, "8476a536");
        assert_eq!(ctx.deadline, 1_542_409_706_888);
        assert_eq!(ctx.deadline(), UNIX_EPOCH + Duration::from_millis(1_542_409_706_888));
        assert!(ctx.invoked_function_arn.ends_with(":howdoi"));
        assert_eq!(ctx.trace_id, None);
        Ok(())
    }

    #[test]
    fn request_id_is_required() {
        let headers = HeaderMap::new();
        assert!(Context::try_from(&headers).is_err());
    }

    #[test]
    fn deadline_must_be_numeric() {
        let mut headers = HeaderMap::new();
        headers.insert("lambda-runtime-aws-request-id", HeaderValue::from_static("1"));
        headers.insert("lambda-runtime-deadline-ms", HeaderValue::from_static("soon"));
        assert!(Context::try_from(&headers).is_err());
    }
}
