//! HTTP surface of the conduit gateway
//!
//! Assembles the model routes, the health probe, and the middleware stack in
//! front of them: tracing, CORS, client identification, client-key check,
//! and admission.

mod admission;
mod auth;
mod client_id;
mod cors;
mod health;
mod request_context;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use conduit_auth::CredentialStore;
use conduit_config::{Config, ServerConfig};
use conduit_llm::{Backend, Gateway, ProcessAgent};
use conduit_ratelimit::AdmissionGate;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    credentials: CredentialStore,
    gate: Arc<AdmissionGate>,
}

impl Server {
    /// Build the server from configuration
    ///
    /// Loads the backend credential from disk and runs requests on the
    /// configured agent executable.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential file cannot be parsed or the
    /// admission gate cannot be built
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let credentials = CredentialStore::from_config(&config.credentials).await?;
        let backend: Arc<dyn Backend> = Arc::new(ProcessAgent::new(config.agent.clone()));

        Self::with_backend(&config, credentials, backend)
    }

    /// Build the server around an existing credential store and backend
    ///
    /// # Errors
    ///
    /// Returns an error if the admission gate cannot be built
    pub fn with_backend(
        config: &Config,
        credentials: CredentialStore,
        backend: Arc<dyn Backend>,
    ) -> anyhow::Result<Self> {
        let listen_address = config.server.listen_address.map_or_else(
            || ServerConfig::DEFAULT_LISTEN.parse(),
            Ok,
        )?;

        let gate = Arc::new(AdmissionGate::new(
            config.server.rate_limit.as_ref(),
            config.server.request_timeout,
        )?);
        let gateway = Gateway::new(config, credentials.clone(), backend);

        // Model routes; layers run outermost-last, so admission sees the
        // identity and request_context sees the deadline
        let mut api = conduit_llm::model_router(gateway.clone())
            .layer(axum::middleware::from_fn(request_context::request_context_middleware));

        let admission_gate = Arc::clone(&gate);
        api = api.layer(axum::middleware::from_fn(move |req, next| {
            let gate = Arc::clone(&admission_gate);
            async move { admission::admission_middleware(gate, req, next).await }
        }));

        if config.server.auth.enabled() {
            let api_keys: Arc<[SecretString]> = config.server.auth.api_keys.clone().into();
            api = api.layer(axum::middleware::from_fn(move |req, next| {
                let api_keys = Arc::clone(&api_keys);
                async move { auth::auth_middleware(api_keys, req, next).await }
            }));
        }

        let cid_config = config.server.client_identification.clone();
        api = api.layer(axum::middleware::from_fn(move |req, next| {
            let config = cid_config.clone();
            async move { client_id::client_id_middleware(config, req, next).await }
        }));

        let mut app = Router::new().merge(api);

        // Health sits outside auth and admission so probes are never throttled
        if config.server.health.enabled {
            app = app.merge(
                Router::new()
                    .route(&config.server.health.path, axum::routing::get(health::health_handler))
                    .with_state(gateway),
            );
        }

        app = app.layer(TraceLayer::new_for_http());

        if let Some(ref cors_config) = config.server.cors {
            app = app.layer(cors::cors_layer(cors_config));
        }

        Ok(Self {
            router: app,
            listen_address,
            credentials,
            gate,
        })
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Peer-address identification needs `ConnectInfo`, which only
    /// `serve` and `serve_with_listener` provide.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Bind the configured address and serve until `shutdown` fires
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.listen_address).await?;
        self.serve_with_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` fires
    ///
    /// Also runs the credential refresh loop and the admission sweeper for
    /// the lifetime of the server.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails
    pub async fn serve_with_listener(self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        let refresh = self.credentials.spawn_refresh_loop(shutdown.child_token());
        let sweeper = self.gate.spawn_sweeper(shutdown.child_token());

        let graceful = shutdown.clone();
        let result = axum::serve(
            listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            graceful.cancelled().await;
            tracing::info!("graceful shutdown initiated");
        })
        .await;

        // Background tasks stop with the server even when serving failed
        shutdown.cancel();
        let _ = refresh.await;
        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }

        result.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use conduit_auth::{AccessToken, Credential, CredentialError, RefreshExchange};
    use conduit_config::{RateLimitConfig, RequestRateLimit};
    use conduit_llm::{AgentError, EventStream};
    use conduit_llm::types::CanonicalRequest;
    use http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use super::*;

    struct NoRefresh;

    #[async_trait]
    impl RefreshExchange for NoRefresh {
        async fn refresh(&self, _refresh_token: &SecretString) -> Result<Credential, CredentialError> {
            Err(CredentialError::RefreshFailed("refresh disabled".to_owned()))
        }
    }

    /// Backend that is never reachable
    struct Offline;

    #[async_trait]
    impl Backend for Offline {
        async fn dispatch(&self, _request: CanonicalRequest, _token: AccessToken) -> Result<EventStream, AgentError> {
            Err(AgentError::Unavailable("offline".to_owned()))
        }

        async fn probe(&self) -> bool {
            false
        }

        fn occupancy(&self) -> usize {
            0
        }
    }

    fn router(config: &Config) -> Router {
        let store = CredentialStore::new(
            None,
            Arc::new(NoRefresh),
            None,
            Duration::from_secs(60),
            Duration::from_secs(5),
        );
        Server::with_backend(config, store, Arc::new(Offline)).unwrap().into_router()
    }

    fn messages_request(key: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/v1/messages").header(header::CONTENT_TYPE, "application/json");
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        builder
            .body(Body::from(
                r#"{"model":"claude-sonnet-4-20250514","max_tokens":8,"messages":[{"role":"user","content":"hi"}]}"#,
            ))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unhealthy_without_credential_or_agent() {
        let response = router(&Config::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["credential"], false);
        assert_eq!(body["agent"], false);
    }

    #[tokio::test]
    async fn unknown_key_is_rejected_in_anthropic_shape() {
        let mut config = Config::default();
        config.server.auth.api_keys = vec![SecretString::from("sk-allowed")];

        let response = router(&config).oneshot(messages_request(Some("sk-other"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "authentication_error");
    }

    #[tokio::test]
    async fn allowed_key_reaches_the_gateway() {
        let mut config = Config::default();
        config.server.auth.api_keys = vec![SecretString::from("sk-allowed")];

        let response = router(&config).oneshot(messages_request(Some("sk-allowed"))).await.unwrap();

        // Past auth, the empty credential store answers
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_skips_auth() {
        let mut config = Config::default();
        config.server.auth.api_keys = vec![SecretString::from("sk-allowed")];

        let response = router(&config)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn over_quota_is_rejected_with_retry_after() {
        let mut config = Config::default();
        config.server.rate_limit = Some(RateLimitConfig {
            global: None,
            per_client: Some(RequestRateLimit {
                requests: 1,
                window: Duration::from_secs(60),
            }),
        });
        let router = router(&config);

        let first = router.clone().oneshot(messages_request(Some("sk-a"))).await.unwrap();
        assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);

        let second = router.clone().oneshot(messages_request(Some("sk-a"))).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(json_body(second).await["error"]["type"], "rate_limit_error");

        // Different key, different bucket
        let other = router.oneshot(messages_request(Some("sk-b"))).await.unwrap();
        assert_ne!(other.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
