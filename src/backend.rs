use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::BackendError;

pub const ASK_PATH: &str = "/ask_ai";
pub const NO_RESPONSE_TEXT: &str = "No response found";

#[derive(Serialize)]
struct AskRequest<'a> {
    query: &'a str,
}

/// Answer payload from the backend. Both fields are optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub ai_answer: Option<String>,
    #[serde(default)]
    pub context_used: Option<String>,
}

impl AskResponse {
    pub fn answer_text(&self) -> &str {
        match self.ai_answer.as_deref() {
            Some(answer) if !answer.is_empty() => answer,
            _ => NO_RESPONSE_TEXT,
        }
    }

    pub fn context_label(&self) -> Option<&str> {
        self.context_used.as_deref().filter(|c| !c.is_empty())
    }
}

/// Anything that can answer a query and honour a cancellation token.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn ask(&self, query: &str, token: CancellationToken) -> Result<AskResponse, BackendError>;
}

#[derive(Clone)]
pub struct RagClient {
    client: Client,
    base_url: String,
    timeout: Option<Duration>,
}

impl RagClient {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, BackendError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_transport_error(&self, err: reqwest::Error) -> BackendError {
        match self.timeout {
            Some(timeout) if err.is_timeout() => BackendError::Timeout {
                secs: timeout.as_secs(),
            },
            _ => BackendError::Network(err),
        }
    }
}

#[async_trait]
impl QueryBackend for RagClient {
    async fn ask(&self, query: &str, token: CancellationToken) -> Result<AskResponse, BackendError> {
        let url = format!("{}{}", self.base_url, ASK_PATH);
        let request_builder = self.client.post(&url).json(&AskRequest { query });

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(target: "raglab::backend", "Cancelled before the backend responded");
                return Err(BackendError::Cancelled);
            }
            res = request_builder.send() => res.map_err(|e| self.map_transport_error(e))?,
        };

        let status = response.status();
        let body = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(target: "raglab::backend", %status, "Cancelled while reading the response body");
                return Err(BackendError::Cancelled);
            }
            text = response.text() => text.map_err(|e| self.map_transport_error(e))?,
        };

        if !status.is_success() {
            let body = body.trim();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: if body.is_empty() {
                    status.canonical_reason().unwrap_or("no body").to_string()
                } else {
                    body.to_string()
                },
            });
        }

        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Read one HTTP request (headers plus Content-Length body) off the socket
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serve a single canned response and hand back the raw request
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            let _ = tx.send(request);
        });

        (format!("http://{}", addr), rx)
    }

    #[test]
    fn test_answer_fallback() {
        let missing = AskResponse::default();
        assert_eq!(missing.answer_text(), NO_RESPONSE_TEXT);

        let empty = AskResponse {
            ai_answer: Some(String::new()),
            context_used: Some(String::new()),
        };
        assert_eq!(empty.answer_text(), NO_RESPONSE_TEXT);
        assert_eq!(empty.context_label(), None);
    }

    #[test]
    fn test_response_ignores_unknown_fields() {
        let parsed: AskResponse =
            serde_json::from_str(r#"{"ai_answer":"X","context_used":"Y","latency_ms":12}"#).unwrap();
        assert_eq!(parsed.answer_text(), "X");
        assert_eq!(parsed.context_label(), Some("Y"));
    }

    #[tokio::test]
    async fn test_ask_posts_query_and_parses_answer() {
        let (base_url, request_rx) =
            serve_once("200 OK", r#"{"ai_answer":"FastAPI is a web framework.","context_used":"fastapi.pdf"}"#).await;
        let client = RagClient::new(&base_url, None).unwrap();

        let response = client.ask("What is FastAPI?", CancellationToken::new()).await.unwrap();
        assert_eq!(response.answer_text(), "FastAPI is a web framework.");
        assert_eq!(response.context_label(), Some("fastapi.pdf"));

        let request = request_rx.await.unwrap();
        assert!(request.starts_with("POST /ask_ai HTTP/1.1"));
        assert!(request.contains(r#"{"query":"What is FastAPI?"}"#));
    }

    #[tokio::test]
    async fn test_ask_maps_error_status() {
        let (base_url, _rx) = serve_once("500 Internal Server Error", r#"{"detail":"index not loaded"}"#).await;
        let client = RagClient::new(&base_url, None).unwrap();

        let err = client.ask("q", CancellationToken::new()).await.unwrap_err();
        match &err {
            BackendError::Status { status, body } => {
                assert_eq!(*status, 500);
                assert!(body.contains("index not loaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.is_cancelled());
    }

    #[tokio::test]
    async fn test_ask_rejects_non_json_body() {
        let (base_url, _rx) = serve_once("200 OK", "<html>oops</html>").await;
        let client = RagClient::new(&base_url, None).unwrap();

        let err = client.ask("q", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[tokio::test]
    async fn test_ask_observes_cancellation() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and never answer
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = RagClient::new(&format!("http://{}", addr), None).unwrap();
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = client.ask("slow question", token).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RagClient::new(&format!("http://{}/", addr), None).unwrap();
        let err = client.ask("q", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BackendError::Network(_)));
        assert!(err.to_string().starts_with("Network error"));
    }
}
