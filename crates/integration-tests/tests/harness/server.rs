//! conduit running in-process on an ephemeral loopback port

use std::net::SocketAddr;

use conduit_server::Server;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::config::ConfigBuilder;

/// Live gateway; stops serving when dropped
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    // Holds the credential file for as long as the server may refresh it
    _state_dir: TempDir,
}

impl TestServer {
    pub async fn start(builder: ConfigBuilder) -> anyhow::Result<Self> {
        let (config, state_dir) = builder.build();
        let server = Server::new(config).await?;

        let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        tokio::spawn(server.serve_with_listener(listener, shutdown.clone()));

        Ok(Self {
            addr,
            shutdown,
            client: reqwest::Client::new(),
            _state_dir: state_dir,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// `GET path` with no extra headers
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.expect("GET reaches the server")
    }

    /// `POST path` with a JSON body and no client key
    pub async fn post(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("POST reaches the server")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
