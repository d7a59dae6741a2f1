//! HTTP implementation of [`ControlPlane`] against the Vault API.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Certificate, Identity, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{ControlPlane, ControlPlaneError, LoginResponse, SnapshotError};
use crate::config::VaultConfig;

const TOKEN_HEADER: &str = "X-Vault-Token";
const LEADER_PATH: &str = "sys/leader";
const RAFT_SNAPSHOT_PATH: &str = "sys/storage/raft/snapshot";

#[derive(Debug, Deserialize)]
struct LeaderBody {
    is_self: bool,
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    auth: Option<AuthBody>,
}

#[derive(Debug, Deserialize)]
struct AuthBody {
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// Vault API client
pub struct VaultClient {
    http: reqwest::Client,
    address: String,
}

impl VaultClient {
    /// Build a client with the configured TLS material.
    pub fn new(config: &VaultConfig) -> Result<Self, ControlPlaneError> {
        let mut builder = reqwest::Client::builder().use_rustls_tls();

        if !config.ca_cert.is_empty() {
            let pem = read_pem(&config.ca_cert)?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }

        if !config.client_cert.is_empty() && !config.client_key.is_empty() {
            let mut pem = read_pem(&config.client_cert)?;
            pem.push(b'\n');
            pem.extend(read_pem(&config.client_key)?);
            builder = builder.identity(Identity::from_pem(&pem)?);
        }

        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
            address: config.address().trim_end_matches('/').to_string(),
        })
    }

    /// The Vault base address requests are sent to
    pub fn address(&self) -> &str {
        &self.address
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }
}

fn read_pem(path: &str) -> Result<Vec<u8>, ControlPlaneError> {
    std::fs::read(path).map_err(|e| ControlPlaneError::Client(format!("cannot read {}: {}", path, e)))
}

/// Turn a non-2xx response into an API error carrying Vault's `errors` list.
async fn check_status(response: Response) -> Result<Response, ControlPlaneError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let raw = response.text().await.unwrap_or_default();
    Err(ControlPlaneError::Api {
        status: status.as_u16(),
        message: error_message(&raw),
    })
}

fn error_message(raw: &str) -> String {
    let body: ErrorBody = serde_json::from_str(raw).unwrap_or_default();
    if body.errors.is_empty() {
        raw.trim().to_string()
    } else {
        body.errors.join("; ")
    }
}

fn parse_login(raw: &[u8]) -> Result<LoginResponse, ControlPlaneError> {
    let body: LoginBody = serde_json::from_slice(raw)
        .map_err(|e| ControlPlaneError::InvalidResponse(format!("login body: {}", e)))?;
    let auth = body
        .auth
        .ok_or_else(|| ControlPlaneError::InvalidResponse("login response has no auth block".to_string()))?;

    Ok(LoginResponse {
        client_token: auth.client_token,
        lease_duration: auth.lease_duration,
    })
}

#[async_trait]
impl ControlPlane for VaultClient {
    async fn approle_login(
        &self,
        mount: &str,
        role_id: &str,
        secret_id: &str,
    ) -> Result<LoginResponse, ControlPlaneError> {
        let url = self.url(&format!("auth/{}/login", mount));
        debug!(url = %url, "Logging in with AppRole");

        let response = self
            .http
            .post(&url)
            .json(&json!({ "role_id": role_id, "secret_id": secret_id }))
            .send()
            .await?;
        let body = check_status(response).await?.bytes().await?;

        parse_login(&body)
    }

    async fn is_leader(&self, token: &str) -> Result<bool, ControlPlaneError> {
        let response = self
            .http
            .get(self.url(LEADER_PATH))
            .header(TOKEN_HEADER, token)
            .send()
            .await?;
        let body = check_status(response).await?.bytes().await?;

        let leader: LeaderBody = serde_json::from_slice(&body)
            .map_err(|e| ControlPlaneError::InvalidResponse(format!("leader body: {}", e)))?;
        Ok(leader.is_self)
    }

    async fn raft_snapshot(&self, token: &str) -> Result<Bytes, SnapshotError> {
        let response = self
            .http
            .get(self.url(RAFT_SNAPSHOT_PATH))
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .map_err(ControlPlaneError::from)?;
        let data = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(ControlPlaneError::from)?;

        if data.is_empty() {
            return Err(SnapshotError::Empty);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let config = VaultConfig {
            address: "https://vault.internal:8200/".to_string(),
            ..Default::default()
        };
        let client = VaultClient::new(&config).unwrap();

        assert_eq!(client.address(), "https://vault.internal:8200");
        assert_eq!(client.url(LEADER_PATH), "https://vault.internal:8200/v1/sys/leader");
        assert_eq!(
            client.url("/auth/approle/login"),
            "https://vault.internal:8200/v1/auth/approle/login"
        );
    }

    #[test]
    fn test_parse_login() {
        let raw = br#"{"request_id":"x","auth":{"client_token":"s.abc","lease_duration":2764800,"renewable":true}}"#;
        let login = parse_login(raw).unwrap();
        assert_eq!(login.client_token, "s.abc");
        assert_eq!(login.lease_duration, 2_764_800);

        assert!(matches!(
            parse_login(br#"{"auth":null}"#),
            Err(ControlPlaneError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_error_message_prefers_vault_errors() {
        assert_eq!(
            error_message(r#"{"errors":["permission denied","second"]}"#),
            "permission denied; second"
        );
        assert_eq!(error_message("upstream timeout\n"), "upstream timeout");
    }

    #[test]
    fn test_missing_ca_file_fails_construction() {
        let config = VaultConfig {
            ca_cert: "/nonexistent/ca.pem".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            VaultClient::new(&config),
            Err(ControlPlaneError::Client(_))
        ));
    }

    /// Serve one canned HTTP response on a local port and hand back the raw
    /// request text once it has been read.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (VaultClient, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];

            // Headers, then as much body as Content-Length announces
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length || n == 0 {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        let config = VaultConfig {
            address,
            ..Default::default()
        };
        (VaultClient::new(&config).unwrap(), server)
    }

    #[tokio::test]
    async fn test_is_leader_reads_is_self_and_sends_token() {
        let (client, server) = serve_once("200 OK", r#"{"ha_enabled":true,"is_self":false}"#).await;

        let leader = client.is_leader("s.test-token").await.unwrap();
        let request = server.await.unwrap().to_ascii_lowercase();

        assert!(!leader);
        assert!(request.starts_with("get /v1/sys/leader http/1.1"));
        assert!(request.contains("x-vault-token: s.test-token"));
    }

    #[tokio::test]
    async fn test_is_leader_true() {
        let (client, server) = serve_once("200 OK", r#"{"is_self":true}"#).await;

        assert!(client.is_leader("s.t").await.unwrap());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_becomes_api_error() {
        let (client, server) = serve_once("403 Forbidden", r#"{"errors":["permission denied"]}"#).await;

        let result = client.is_leader("s.revoked").await;
        server.await.unwrap();

        match result {
            Err(ControlPlaneError::Api { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "permission denied");
            }
            other => panic!("expected an API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_approle_login_posts_credentials() {
        let (client, server) = serve_once(
            "200 OK",
            r#"{"auth":{"client_token":"s.fresh","lease_duration":600}}"#,
        )
        .await;

        let login = client.approle_login("ci-approle", "role-1", "secret-1").await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(login.client_token, "s.fresh");
        assert_eq!(login.lease_duration, 600);
        assert!(request.starts_with("POST /v1/auth/ci-approle/login HTTP/1.1"));
        assert!(request.contains(r#""role_id":"role-1""#));
        assert!(request.contains(r#""secret_id":"secret-1""#));
    }

    #[tokio::test]
    async fn test_raft_snapshot_returns_body() {
        let (client, server) = serve_once("200 OK", "raft-bytes").await;

        let data = client.raft_snapshot("s.t").await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(data, Bytes::from_static(b"raft-bytes"));
        assert!(request.starts_with("GET /v1/sys/storage/raft/snapshot HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_empty_snapshot_body_is_an_error() {
        let (client, server) = serve_once("200 OK", "").await;

        let result = client.raft_snapshot("s.t").await;
        server.await.unwrap();

        assert!(matches!(result, Err(SnapshotError::Empty)));
    }

    #[tokio::test]
    async fn test_snapshot_error_status_is_a_request_error() {
        let (client, server) = serve_once("500 Internal Server Error", r#"{"errors":["raft not ready"]}"#).await;

        let result = client.raft_snapshot("s.t").await;
        server.await.unwrap();

        assert!(matches!(
            result,
            Err(SnapshotError::Request(ControlPlaneError::Api { status: 500, .. }))
        ));
    }
}
