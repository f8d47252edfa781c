//! Gateway orchestrator: decode, credential, dispatch, relay

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use conduit_auth::CredentialStore;
use conduit_config::{Config, LlmConfig};
use conduit_core::RequestContext;
use conduit_ratelimit::RequestDeadline;
use futures_util::Stream;

use crate::adapter::{Decoded, Dialect, SseFrame};
use crate::backend::Backend;
use crate::convert::DecodeOptions;
use crate::error::GatewayError;
use crate::models::ModelMap;
use crate::policy::ToolCallFilter;
use crate::protocol::openai::OpenAiModelList;
use crate::relay::Relay;

/// Encoded frames of a streamed response
pub type FrameStream = Pin<Box<dyn Stream<Item = SseFrame> + Send>>;

/// What a handled request produced
pub enum GatewayResponse {
    /// Complete JSON body
    Complete(Vec<u8>),
    /// SSE frames, in order
    Stream(FrameStream),
}

impl std::fmt::Debug for GatewayResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(body) => f.debug_tuple("Complete").field(&body.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Readiness of the gateway's two dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// A non-expired backend credential is held
    pub credential: bool,
    /// The agent probe succeeded
    pub agent: bool,
}

impl Readiness {
    /// Whether requests can be served
    pub const fn is_ready(&self) -> bool {
        self.credential && self.agent
    }
}

/// Shared state for the model routes
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    llm: LlmConfig,
    sandbox_root: Option<PathBuf>,
    request_timeout: Duration,
    models: ModelMap,
    credentials: CredentialStore,
    backend: Arc<dyn Backend>,
}

impl Gateway {
    /// Gateway over a credential store and a backend
    pub fn new(config: &Config, credentials: CredentialStore, backend: Arc<dyn Backend>) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                llm: config.llm.clone(),
                sandbox_root: config.agent.sandbox.working_directory.clone(),
                request_timeout: config.server.request_timeout,
                models: ModelMap::new(&config.llm.models),
                credentials,
                backend,
            }),
        }
    }

    /// Models for `GET /v1/models`
    pub fn list_models(&self) -> OpenAiModelList {
        self.inner.models.list()
    }

    /// Credential and agent readiness, for health checks
    pub async fn readiness(&self) -> Readiness {
        let (credential, agent) = tokio::join!(self.inner.credentials.has_valid_token(), self.inner.backend.probe());
        Readiness { credential, agent }
    }

    /// Run one model request end to end
    ///
    /// The deadline set at admission is honoured when present in the
    /// request extensions; otherwise the configured request timeout starts now.
    pub async fn handle(
        &self,
        dialect: Dialect,
        body: &[u8],
        context: &RequestContext,
    ) -> Result<GatewayResponse, GatewayError> {
        let deadline = context
            .parts
            .extensions
            .get::<RequestDeadline>()
            .copied()
            .unwrap_or_else(|| RequestDeadline::after(self.inner.request_timeout));

        let Decoded {
            mut request,
            include_usage,
        } = dialect.decode(
            body,
            DecodeOptions {
                llm: &self.inner.llm,
                sandbox_root: self.inner.sandbox_root.as_deref(),
            },
        )?;

        let token = self.inner.credentials.current_token().await?;

        let client_model = std::mem::take(&mut request.model);
        request.model = self.inner.models.resolve(&client_model).to_owned();
        let meta = dialect.response_meta(&client_model);
        let stream = request.stream;
        let filter = ToolCallFilter::for_request(self.inner.llm.tool_call_policy, request.parallel_tool_calls);

        tracing::debug!(
            dialect = %dialect,
            client = context.client_key(),
            model = %client_model,
            backend_model = %request.model,
            stream,
            response_id = %meta.id,
            "dispatching request"
        );

        let events = tokio::time::timeout_at(deadline.instant(), self.inner.backend.dispatch(request, token))
            .await
            .map_err(|_| GatewayError::RequestTimeout(deadline.timeout()))??;

        let relay = Relay::new(events, deadline)
            .with_filter(filter)
            .with_request_id(meta.id.clone());

        if stream {
            let encoder = dialect.stream_encoder(meta, include_usage);
            return Ok(GatewayResponse::Stream(Box::pin(relay.into_frames(encoder))));
        }

        let response = relay.collect_response().await?;
        dialect.encode_terminal(&response, &meta).map(GatewayResponse::Complete)
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("request_timeout", &self.inner.request_timeout)
            .field("sessions_in_use", &self.inner.backend.occupancy())
            .finish_non_exhaustive()
    }
}
