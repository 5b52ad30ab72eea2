use http::{Request, header::CONTENT_TYPE};
use http_body_util::BodyExt;
use hyper::body::Body;
use serde::Deserialize;
use tracing::trace;
use url::form_urlencoded;

use crate::{HttpMethod, IncomingRequest, RawInput, query_gateway::GatewayError};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonParams {
    query: Option<String>,
    operation_name: Option<String>,
    variables: Option<RawInput>,
    extensions: Option<RawInput>,
}

impl IncomingRequest {
    /// Overlays `query`, `operationName`, `variables` and `extensions` from a
    /// urlencoded string; the last occurrence of a key wins.
    fn merge_form(&mut self, input: &[u8]) {
        for (key, value) in form_urlencoded::parse(input) {
            match key.as_ref() {
                "query" => self.query = Some(value.into_owned()),
                "operationName" => self.operation_name = Some(value.into_owned()),
                "variables" => self.variables = RawInput::Text(value.into_owned()),
                "extensions" => self.extensions = RawInput::Text(value.into_owned()),
                _ => {}
            }
        }
    }

    fn merge_json(&mut self, body: &[u8]) -> Result<(), GatewayError> {
        let params: JsonParams = serde_json::from_slice(body)
            .map_err(|e| GatewayError::MalformedBody(e.to_string()))?;

        if params.query.is_some() {
            self.query = params.query;
        }
        if params.operation_name.is_some() {
            self.operation_name = params.operation_name;
        }
        if let Some(variables) = params.variables {
            self.variables = variables;
        }
        if let Some(extensions) = params.extensions {
            self.extensions = extensions;
        }
        Ok(())
    }
}

/// Builds an [`IncomingRequest`] from the URL query string and, for POST,
/// the body. Body fields take precedence over query-string fields.
pub async fn read_incoming_request<B>(
    method: HttpMethod,
    req: Request<B>,
) -> Result<IncomingRequest, GatewayError>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let mut incoming = IncomingRequest {
        method,
        ..Default::default()
    };

    if let Some(query_string) = req.uri().query() {
        incoming.merge_form(query_string.as_bytes());
    }

    if method == HttpMethod::Get {
        return Ok(incoming);
    }

    let is_form = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE));

    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| GatewayError::BodyRead(e.to_string()))?
        .to_bytes();

    if body.iter().all(u8::is_ascii_whitespace) {
        trace!("empty POST body");
    } else if is_form {
        incoming.merge_form(&body);
    } else {
        incoming.merge_json(&body)?;
    }

    Ok(incoming)
}
