//! Transport seam between the scheduler and the chat-completion endpoint.

use std::{future::Future, pin::Pin, sync::Arc};

use reqwest::header::{HeaderName, HeaderValue, ACCEPT};

use crate::{
    credentials::{Credential, CredentialStore},
    errors::{Error, Result, TransportError, TransportErrorKind},
    http::{parse_api_error_parts, HeaderList},
    types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Model, TaskRequest},
    CLIENT_TITLE_HEADER, REFERER_HEADER, REQUEST_ID_HEADER,
};

/// Boxed future type used for object-safe async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that can turn a task request into completion text.
///
/// Implementations never retry; a failed call is reported once.
pub trait ChatGateway: Send + Sync {
    fn send<'a>(&'a self, request: &'a TaskRequest) -> BoxFuture<'a, Result<String>>;
}

/// Gateway speaking the OpenAI-compatible `chat/completions` protocol over HTTP.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    http: reqwest::Client,
    url: reqwest::Url,
    credentials: Arc<CredentialStore>,
    default_model: Model,
    client_header: String,
    referer: Option<String>,
    default_headers: HeaderList,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

/// Options collected by [`crate::Client::new`] for building an [`HttpGateway`].
#[derive(Debug, Clone)]
pub(crate) struct HttpGatewayOptions {
    pub(crate) client_header: String,
    pub(crate) referer: Option<String>,
    pub(crate) default_headers: HeaderList,
    pub(crate) default_model: Model,
    pub(crate) temperature: Option<f32>,
    pub(crate) max_tokens: Option<u32>,
}

impl HttpGateway {
    pub(crate) fn new(
        http: reqwest::Client,
        url: reqwest::Url,
        credentials: Arc<CredentialStore>,
        opts: HttpGatewayOptions,
    ) -> Self {
        Self {
            http,
            url,
            credentials,
            default_model: opts.default_model,
            client_header: opts.client_header,
            referer: opts.referer,
            default_headers: opts.default_headers,
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
        }
    }

    /// Issue one completion call and return the first choice's text.
    pub async fn complete(&self, request: &TaskRequest) -> Result<String> {
        request.validate()?;
        let credential = self.credentials.get()?;
        let model = request.model.as_ref().unwrap_or(&self.default_model);
        let request_id = uuid::Uuid::new_v4().to_string();

        let resp = self
            .post(&credential, model, &request.messages, &request_id)
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let headers = resp.headers().clone();
            let body = resp.text().await.unwrap_or_default();
            let err = parse_api_error_parts(status, &headers, body);
            #[cfg(feature = "tracing")]
            tracing::warn!(
                task = %request.kind,
                request_id = %request_id,
                status = status.as_u16(),
                error = %err,
                "completion request failed"
            );
            return Err(err);
        }

        let bytes = resp.bytes().await.map_err(to_transport_error)?;
        let payload: ChatCompletionResponse = serde_json::from_slice(&bytes)?;
        match payload.first_content() {
            Some(content) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    task = %request.kind,
                    request_id = %request_id,
                    chars = content.len(),
                    "completion received"
                );
                Ok(content)
            }
            None => Err(TransportError::new(
                TransportErrorKind::EmptyResponse,
                "completion carried no message content",
            )
            .into()),
        }
    }

    /// Send a one-line probe and hand back the raw status and body.
    pub(crate) async fn probe(
        &self,
        credential: &Credential,
        model: &Model,
    ) -> Result<(u16, serde_json::Value)> {
        let messages = [ChatMessage::user("Hello - minimal connectivity test")];
        let request_id = uuid::Uuid::new_v4().to_string();
        let resp = self.post(credential, model, &messages, &request_id).await?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(to_transport_error)?;
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
        Ok((status, body))
    }

    async fn post(
        &self,
        credential: &Credential,
        model: &Model,
        messages: &[ChatMessage],
        request_id: &str,
    ) -> Result<reqwest::Response> {
        let body = ChatCompletionRequest {
            model: model.as_str(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let mut builder = self
            .http
            .post(self.url.clone())
            .bearer_auth(credential.as_str())
            .header(ACCEPT, "application/json")
            .header(CLIENT_TITLE_HEADER, &self.client_header)
            .header(REQUEST_ID_HEADER, request_id);
        if let Some(referer) = &self.referer {
            builder = builder.header(REFERER_HEADER, referer);
        }
        for entry in self.default_headers.iter() {
            if !entry.is_valid() {
                continue;
            }
            let name = HeaderName::from_bytes(entry.key.trim().as_bytes())
                .map_err(|err| Error::Config(format!("invalid header name: {err}")))?;
            let value = HeaderValue::from_str(entry.value.trim())
                .map_err(|err| Error::Config(format!("invalid header value: {err}")))?;
            builder = builder.header(name, value);
        }

        builder.json(&body).send().await.map_err(to_transport_error)
    }
}

impl ChatGateway for HttpGateway {
    fn send<'a>(&'a self, request: &'a TaskRequest) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.complete(request))
    }
}

fn to_transport_error(err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_request() {
        TransportErrorKind::Request
    } else {
        TransportErrorKind::Other
    };

    TransportError {
        kind,
        message: err.to_string(),
        source: Some(err),
    }
    .into()
}
