//! 安全邮件服务端 REST 客户端
//!
//! 实现 [`Directory`] 与 [`Storage`]，并提供账户相关接口。
//! 服务端以会话 Cookie 认证，登录后保存在客户端内。

use crate::backend::{Directory, Storage};
use crate::error::{Error, Result};
use crate::types::*;
use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 客户端配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// 服务器 URL
    pub server_url: String,
    /// 请求超时（秒）
    pub timeout: u64,
    /// 是否验证 TLS 证书
    pub verify_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".to_string(),
            timeout: 30,
            verify_tls: true,
        }
    }
}

/// 安全邮件客户端
pub struct MailClient {
    config: ClientConfig,
    http_client: Client,
    /// 当前会话 Cookie（`name=value`）
    session_cookie: Arc<RwLock<Option<String>>>,
}

impl MailClient {
    /// 创建新的客户端实例
    pub fn new(config: ClientConfig) -> Result<Self> {
        Url::parse(&config.server_url)
            .map_err(|e| Error::InvalidParam(format!("Invalid server URL: {}", e)))?;

        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
            session_cookie: Arc::new(RwLock::new(None)),
        })
    }

    /// 使用默认配置创建客户端
    pub fn with_server_url(server_url: &str) -> Result<Self> {
        let config = ClientConfig {
            server_url: server_url.to_string(),
            ..ClientConfig::default()
        };
        Self::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 注册账户，同时提交公钥
    pub async fn register(&self, username: &str, password: &str, public_key: &str) -> Result<()> {
        info!("Registering user: {}", username);

        self.call_json::<serde_json::Value>(
            Method::POST,
            &["api", "create"],
            Some(serde_json::json!({
                "username": username,
                "password": password,
                "publicKey": public_key,
            })),
        )
        .await?;

        info!("User registered successfully: {}", username);
        Ok(())
    }

    /// 用户登录
    pub async fn login(&self, username: &str, password: &str, remember: bool) -> Result<()> {
        info!("Logging in user: {}", username);

        let url = self.endpoint(&["api", "login"])?;
        let response = self
            .http_client
            .post(url)
            .json(&serde_json::json!({
                "username": username,
                "password": password,
                "remember": remember,
            }))
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let cookie = session_cookie_from(&response);
        check_status(response).await?;

        let cookie = cookie.ok_or_else(|| {
            Error::InvalidState("Login succeeded but no session cookie was issued".to_string())
        })?;
        *self.session_cookie.write().await = Some(cookie);

        info!("User logged in successfully");
        Ok(())
    }

    /// 用户登出
    pub async fn logout(&self) -> Result<()> {
        if self.session_cookie.read().await.is_none() {
            return Err(Error::NotAuthenticated);
        }

        if let Err(e) = self
            .call_json::<serde_json::Value>(Method::GET, &["api", "logout"], None)
            .await
        {
            warn!("Logout request failed, but continuing anyway: {}", e);
        }

        *self.session_cookie.write().await = None;
        info!("User logged out successfully");
        Ok(())
    }

    /// 删除账户，服务端同时删除其全部消息
    pub async fn delete_account(&self) -> Result<()> {
        self.call_json::<serde_json::Value>(Method::DELETE, &["api", "account"], None)
            .await?;
        *self.session_cookie.write().await = None;
        info!("Account deleted");
        Ok(())
    }

    /// 获取当前会话 Cookie
    pub async fn session_cookie(&self) -> Option<String> {
        self.session_cookie.read().await.clone()
    }

    /// 设置会话 Cookie（从文件恢复）
    pub async fn set_session_cookie(&self, cookie: String) {
        *self.session_cookie.write().await = Some(cookie);
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config.server_url)
            .map_err(|e| Error::InvalidParam(format!("Invalid server URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidParam("Server URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let url = self.endpoint(segments)?;
        let mut builder = self.http_client.request(method, url);
        if let Some(cookie) = self.session_cookie.read().await.as_ref() {
            builder = builder.header(COOKIE, cookie.as_str());
        }
        Ok(builder)
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<serde_json::Value>,
    ) -> Result<Response> {
        let mut builder = self.request(method.clone(), segments).await?;
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        debug!("{} /{}", method, segments.join("/"));
        builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to reach {}: {}", self.config.server_url, e)))
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let response = check_status(self.send(method, segments, body).await?).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse response: {}", e)))
    }
}

/// 从 `Set-Cookie` 中取出 `name=value`
fn session_cookie_from(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .find(|pair| pair.contains('='))
        .map(str::to_string)
}

/// 检查 HTTP 状态码，错误体 `{ "error": ... }` 转为 API 错误
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::NotAuthenticated);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read response".to_string());
    let message = serde_json::from_str::<ApiError>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    Err(Error::Api {
        code: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Directory for MailClient {
    async fn lookup_public_key(&self, username: &str) -> Result<Option<String>> {
        let response = self
            .send(Method::GET, &["api", "publicKey", username], None)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let data: PublicKeyResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse response: {}", e)))?;
        Ok(Some(data.public_key))
    }

    /// 服务端按会话身份保存公钥，`username` 仅用于日志
    async fn upload_public_key(&self, username: &str, public_key: &str) -> Result<()> {
        self.call_json::<serde_json::Value>(
            Method::POST,
            &["api", "publicKey"],
            Some(serde_json::json!({ "publicKey": public_key })),
        )
        .await?;
        info!("Public key uploaded for {}", username);
        Ok(())
    }
}

#[async_trait]
impl Storage for MailClient {
    async fn create_message(&self, message: NewMessage) -> Result<RecordId> {
        let created: CreatedResponse = self
            .call_json(
                Method::POST,
                &["api", "messages"],
                Some(serde_json::json!({
                    "to": message.to,
                    "subjectForRecipient": message.subject_for_recipient,
                    "bodyForRecipient": message.body_for_recipient,
                    "subjectForSelf": message.subject_for_self,
                    "bodyForSelf": message.body_for_self,
                })),
            )
            .await?;
        Ok(created.id)
    }

    async fn create_draft(&self, draft: NewDraft) -> Result<RecordId> {
        let created: CreatedResponse = self
            .call_json(
                Method::POST,
                &["api", "drafts"],
                Some(serde_json::json!({
                    "to": draft.to,
                    "subjectEncrypted": draft.subject_encrypted,
                    "bodyEncrypted": draft.body_encrypted,
                })),
            )
            .await?;
        Ok(created.id)
    }

    /// 服务端按会话身份过滤，过滤条件只决定视图
    async fn list_messages(&self, filter: MessageFilter) -> Result<Vec<MessageRecord>> {
        let segments: &[&str] = match filter {
            MessageFilter::ReceivedBy(_) => &["api", "messages"],
            MessageFilter::SentBy(_) => &["api", "sent"],
        };
        self.call_json(Method::GET, segments, None).await
    }

    async fn list_drafts(&self, owner: &str) -> Result<Vec<DraftRecord>> {
        let mut drafts: Vec<DraftRecord> =
            self.call_json(Method::GET, &["api", "drafts"], None).await?;
        for draft in &mut drafts {
            if draft.owner.is_empty() {
                draft.owner = owner.to_string();
            }
        }
        Ok(drafts)
    }

    async fn delete_message(&self, _viewer: &str, id: RecordId) -> Result<()> {
        let id = id.to_string();
        self.call_json::<serde_json::Value>(Method::DELETE, &["api", "messages", &id], None)
            .await?;
        Ok(())
    }

    async fn delete_draft(&self, _owner: &str, id: RecordId) -> Result<()> {
        let id = id.to_string();
        self.call_json::<serde_json::Value>(Method::DELETE, &["api", "drafts", &id], None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// 只应答一次的 HTTP 服务，返回收到的原始请求
    async fn serve_once(status: &str, headers: &[&str], body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let mut response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
            status,
            body.len()
        );
        for header in headers {
            response.push_str(header);
            response.push_str("\r\n");
        }
        response.push_str("\r\n");
        response.push_str(body);

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let content_length = text[..end]
                        .lines()
                        .filter_map(|line| line.split_once(':'))
                        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + content_length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });

        (url, handle)
    }

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "http://127.0.0.1:3000");
        assert_eq!(config.timeout, 30);
        assert!(config.verify_tls);
    }

    #[test]
    fn test_with_server_url_keeps_defaults() {
        let client = MailClient::with_server_url("https://mail.example.com").unwrap();
        let config = client.config();
        assert_eq!(config.server_url, "https://mail.example.com");
        assert_eq!(config.timeout, ClientConfig::default().timeout);
        assert!(config.verify_tls);
    }

    #[test]
    fn test_invalid_server_url() {
        assert!(matches!(
            MailClient::with_server_url("not a url"),
            Err(Error::InvalidParam(_))
        ));
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let client = MailClient::with_server_url("http://localhost:3000/").unwrap();
        let url = client.endpoint(&["api", "publicKey", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/publicKey/a%20b%2Fc");
    }

    #[tokio::test]
    async fn test_login_stores_session_cookie() {
        let (url, server) = serve_once(
            "200 OK",
            &["Set-Cookie: connect.sid=s%3Aabc123; Path=/; HttpOnly"],
            r#"{"success":true}"#,
        )
        .await;

        let client = MailClient::with_server_url(&url).unwrap();
        client.login("alice", "Secret#123", true).await.unwrap();
        assert_eq!(
            client.session_cookie().await.as_deref(),
            Some("connect.sid=s%3Aabc123")
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/login"));
        assert!(request.contains("\"remember\":true"));
    }

    #[tokio::test]
    async fn test_lookup_missing_key_is_none() {
        let (url, server) = serve_once("404 Not Found", &[], r#"{"error":"Not found"}"#).await;

        let client = MailClient::with_server_url(&url).unwrap();
        client.set_session_cookie("connect.sid=xyz".to_string()).await;
        assert_eq!(client.lookup_public_key("bob").await.unwrap(), None);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/publicKey/bob"));
        assert!(request.to_ascii_lowercase().contains("cookie: connect.sid=xyz"));
    }

    #[tokio::test]
    async fn test_error_body_becomes_api_error() {
        let (url, server) = serve_once("400 Bad Request", &[], r#"{"error":"Recipient not found"}"#).await;

        let client = MailClient::with_server_url(&url).unwrap();
        let result = client
            .create_message(NewMessage {
                from: "alice".into(),
                to: "ghost".into(),
                subject_for_recipient: "a".into(),
                body_for_recipient: "b".into(),
                subject_for_self: "c".into(),
                body_for_self: "d".into(),
            })
            .await;
        match result {
            Err(Error::Api { code, message }) => {
                assert_eq!(code, 400);
                assert_eq!(message, "Recipient not found");
            }
            other => panic!("expected API error, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_not_authenticated() {
        let (url, server) = serve_once("401 Unauthorized", &[], r#"{"error":"Not authenticated"}"#).await;

        let client = MailClient::with_server_url(&url).unwrap();
        let result = client.list_drafts("alice").await;
        assert!(matches!(result, Err(Error::NotAuthenticated)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_list_drafts_fills_owner() {
        let body = r#"[{"id":"6f9619ff-8b86-4011-b42d-00c04fc964ff","to":"bob","subjectEncrypted":"YQ==","bodyEncrypted":"Yg==","timestamp":"2024-05-01T12:00:00Z"}]"#;
        let (url, server) = serve_once("200 OK", &[], body).await;

        let client = MailClient::with_server_url(&url).unwrap();
        let drafts = client.list_drafts("alice").await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].owner, "alice");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_requires_session() {
        let client = MailClient::with_server_url("http://127.0.0.1:9").unwrap();
        assert!(matches!(client.logout().await, Err(Error::NotAuthenticated)));
    }
}
