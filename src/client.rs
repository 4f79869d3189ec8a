use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use crate::{
    credentials::{Credential, CredentialStore},
    errors::{ApiErrorKind, Error, Result, TransportError, TransportErrorKind},
    gateway::{ChatGateway, HttpGateway, HttpGatewayOptions},
    generate::GenerationClient,
    http::HeaderList,
    policy::{ContentPolicy, SubstringScreen},
    scheduler::RequestScheduler,
    telemetry::{MetricsCallbacks, Telemetry},
    types::{Model, TaskRequest},
    COMPLETIONS_PATH, DEFAULT_BASE_URL, DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_MIN_INTERVAL, DEFAULT_REQUEST_TIMEOUT, ENV_API_KEY, ENV_MIN_INTERVAL_MS,
};

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// API base URL (defaults to OpenRouter). Calls go to `{base_url}/chat/completions`.
    pub base_url: Option<String>,
    /// Initial credential. Blank values are ignored; the credential can be set later.
    pub api_key: Option<String>,
    /// Default model (defaults to `deepseek/deepseek-r1:free`).
    pub model: Option<Model>,
    /// Value of the `X-Title` header.
    pub client_header: Option<String>,
    /// Value of the `HTTP-Referer` header.
    pub referer: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the per-call timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    /// Minimum spacing between two dispatched calls (defaults to 350ms).
    pub min_interval: Option<Duration>,
    /// Default extra headers applied to all requests.
    pub default_headers: Option<HeaderList>,
    /// Screen for free-text answers (defaults to [`SubstringScreen::new`]).
    pub content_policy: Option<Arc<dyn ContentPolicy>>,
    /// Optional metrics callbacks (dispatches and fallbacks).
    pub metrics: Option<MetricsCallbacks>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Config {
    /// Defaults plus the development overrides from the environment.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Config {
            api_key: std::env::var(ENV_API_KEY).ok().filter(|v| !v.trim().is_empty()),
            ..Default::default()
        };
        if let Ok(raw) = std::env::var(ENV_MIN_INTERVAL_MS) {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{ENV_MIN_INTERVAL_MS} must be milliseconds, got {raw:?}"))
            })?;
            cfg.min_interval = Some(Duration::from_millis(ms));
        }
        Ok(cfg)
    }
}

/// Entry point: owns the credential slot, the request queue and the selected model.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) credentials: Arc<CredentialStore>,
    pub(crate) http: HttpGateway,
    pub(crate) scheduler: RequestScheduler,
    pub(crate) model: RwLock<Model>,
    pub(crate) policy: Arc<dyn ContentPolicy>,
    pub(crate) telemetry: Telemetry,
}

impl ClientInner {
    pub(crate) fn current_model(&self) -> Model {
        self.model.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Outcome class of a connectivity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Ok,
    Unauthorized,
    InsufficientBalance,
    RateLimited,
    Other,
}

impl ConnectivityStatus {
    fn from_status(status: u16) -> Self {
        if (200..300).contains(&status) {
            return ConnectivityStatus::Ok;
        }
        match ApiErrorKind::from_status(status) {
            ApiErrorKind::Unauthorized => ConnectivityStatus::Unauthorized,
            ApiErrorKind::InsufficientBalance => ConnectivityStatus::InsufficientBalance,
            ApiErrorKind::RateLimited => ConnectivityStatus::RateLimited,
            ApiErrorKind::Upstream => ConnectivityStatus::Other,
        }
    }
}

/// Raw answer of the endpoint to a minimal probe request.
#[derive(Debug, Clone)]
pub struct ConnectivityReport {
    pub status: u16,
    pub kind: ConnectivityStatus,
    pub body: serde_json::Value,
}

impl ConnectivityReport {
    pub fn is_ok(&self) -> bool {
        self.kind == ConnectivityStatus::Ok
    }
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        Self::build(cfg, None)
    }

    /// Build a client whose queue dispatches to `gateway` instead of HTTP.
    pub fn with_gateway(cfg: Config, gateway: Arc<dyn ChatGateway>) -> Result<Self> {
        Self::build(cfg, Some(gateway))
    }

    fn build(cfg: Config, gateway: Option<Arc<dyn ChatGateway>>) -> Result<Self> {
        let base = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base = format!("{}/", base.trim().trim_end_matches('/'));
        let url = reqwest::Url::parse(&base)
            .and_then(|base| base.join(COMPLETIONS_PATH))
            .map_err(|err| Error::Config(format!("invalid base url: {err}")))?;

        let connect_timeout = cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let call_timeout = cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let min_interval = cfg.min_interval.unwrap_or(DEFAULT_MIN_INTERVAL);
        if call_timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".to_string()));
        }

        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(|err| TransportError {
                    kind: TransportErrorKind::Connect,
                    message: "failed to build http client".to_string(),
                    source: Some(err),
                })?,
        };

        let credentials = Arc::new(CredentialStore::new());
        if let Some(key) = cfg.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            credentials.set(key)?;
        }

        let model = cfg.model.filter(|m| !m.is_empty()).unwrap_or_default();
        let client_header = cfg
            .client_header
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CLIENT_HEADER.to_string());
        let http_gateway = HttpGateway::new(
            http,
            url,
            credentials.clone(),
            HttpGatewayOptions {
                client_header,
                referer: cfg.referer.filter(|s| !s.trim().is_empty()),
                default_headers: cfg.default_headers.unwrap_or_default(),
                default_model: model.clone(),
                temperature: cfg.temperature,
                max_tokens: cfg.max_tokens,
            },
        );

        let telemetry = Telemetry::new(cfg.metrics);
        let dispatch_gateway: Arc<dyn ChatGateway> = match gateway {
            Some(gateway) => gateway,
            None => Arc::new(http_gateway.clone()),
        };
        let scheduler = RequestScheduler::with_telemetry(
            dispatch_gateway,
            min_interval,
            call_timeout,
            telemetry.clone(),
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                credentials,
                http: http_gateway,
                scheduler,
                model: RwLock::new(model),
                policy: cfg
                    .content_policy
                    .unwrap_or_else(|| Arc::new(SubstringScreen::new())),
                telemetry,
            }),
        })
    }

    /// The four wizard operations (plus batch descriptions and questions).
    pub fn generator(&self) -> GenerationClient {
        GenerationClient {
            inner: self.inner.clone(),
        }
    }

    pub fn scheduler(&self) -> &RequestScheduler {
        &self.inner.scheduler
    }

    pub fn set_credential(&self, raw: impl AsRef<str>) -> Result<()> {
        self.inner.credentials.set(raw)
    }

    /// The stored credential, or [`Error::NoCredential`].
    pub fn credential(&self) -> Result<Credential> {
        self.inner.credentials.get()
    }

    pub fn clear_credential(&self) {
        self.inner.credentials.clear()
    }

    pub fn is_credential_set(&self) -> bool {
        self.inner.credentials.is_set()
    }

    /// Select the model used by subsequent calls without an explicit override.
    pub fn set_model(&self, model: impl Into<Model>) -> Result<()> {
        let model = model.into();
        if model.is_empty() {
            return Err(Error::Config("model is required".to_string()));
        }
        *self.inner.model.write().unwrap_or_else(|e| e.into_inner()) = model;
        Ok(())
    }

    pub fn model(&self) -> Model {
        self.inner.current_model()
    }

    /// Queue a raw task and return the completion text.
    ///
    /// Unlike the [`GenerationClient`] operations this surfaces every failure,
    /// including [`Error::NoCredential`].
    pub async fn send(&self, request: TaskRequest) -> Result<String> {
        self.inner.credentials.get()?;
        let request = match request.model {
            Some(_) => request,
            None => {
                let model = self.inner.current_model();
                request.with_model(model)
            }
        };
        self.inner.scheduler.submit(request).await
    }

    /// Probe the endpoint with `key` (or the stored credential) and report the raw outcome.
    ///
    /// Non-2xx answers are reported, not raised; transport failures are errors.
    /// The probe does not go through the queue and never stores `key`.
    pub async fn check_credential(
        &self,
        key: Option<&str>,
        model: Option<Model>,
    ) -> Result<ConnectivityReport> {
        let credential = match key {
            Some(raw) => Credential::parse(raw)?,
            None => self.inner.credentials.get()?,
        };
        let model = model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.inner.current_model());
        let (status, body) = self.inner.http.probe(&credential, &model).await?;
        let kind = ConnectivityStatus::from_status(status);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            task = %crate::types::TaskKind::ConnectivityCheck,
            credential = %credential.masked(),
            model = %model,
            status,
            "connectivity check finished"
        );
        Ok(ConnectivityReport { status, kind, body })
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("model", &self.inner.current_model())
            .field("credential_set", &self.inner.credentials.is_set())
            .field("scheduler", &self.inner.scheduler)
            .finish_non_exhaustive()
    }
}
