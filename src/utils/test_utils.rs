use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::core::custom_providers::{CustomModel, CustomProviderConfig, ProviderStatus};

pub fn sample_custom_provider(id: &str, name: &str) -> CustomProviderConfig {
    CustomProviderConfig {
        id: id.to_string(),
        name: name.to_string(),
        api_key: "sk-lab".to_string(),
        base_url: "https://llm.lab.example".to_string(),
        provider_type: "openai".to_string(),
        status: ProviderStatus::Active,
        enable_key_list: None,
        disable_key_list: None,
        models: Some(vec![
            CustomModel {
                name: "llama-3-70b".to_string(),
                display_name: Some("Llama 3".to_string()),
                available: true,
                enable_vision: None,
                description: None,
            },
            CustomModel {
                name: "qwen2-vl-72b".to_string(),
                display_name: None,
                available: true,
                enable_vision: Some(true),
                description: None,
            },
        ]),
        paths: None,
        test_model: None,
    }
}

/// A request as seen by [`ScriptedServer`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body should be JSON")
    }
}

/// A canned reply. The body is written in parts, each after `part_delay`.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    status: u16,
    content_type: String,
    parts: Vec<String>,
    head_delay: Duration,
    part_delay: Duration,
    hold_open: bool,
}

impl ScriptedResponse {
    pub fn new(status: u16, content_type: &str, body: &str) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            parts: vec![body.to_string()],
            head_delay: Duration::ZERO,
            part_delay: Duration::ZERO,
            hold_open: false,
        }
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::new(status, "application/json", &body.to_string())
    }

    /// One `data:` event per payload, without a terminating `[DONE]`.
    pub fn sse<S: AsRef<str>>(payloads: &[S]) -> Self {
        let mut response = Self::new(200, "text/event-stream", "");
        response.parts = payloads
            .iter()
            .map(|payload| format!("data: {}\n\n", payload.as_ref()))
            .collect();
        response
    }

    /// Streams `content` deltas followed by `[DONE]`.
    pub fn sse_content(deltas: &[&str]) -> Self {
        let mut payloads: Vec<String> = deltas
            .iter()
            .map(|delta| {
                serde_json::json!({"choices": [{"delta": {"content": delta}}]}).to_string()
            })
            .collect();
        payloads.push("[DONE]".to_string());
        Self::sse(&payloads)
    }

    pub fn with_head_delay(mut self, delay: Duration) -> Self {
        self.head_delay = delay;
        self
    }

    pub fn with_part_delay(mut self, delay: Duration) -> Self {
        self.part_delay = delay;
        self
    }

    /// Keeps the connection open after the last part.
    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            404 => "Not Found",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            _ => "Status",
        }
    }
}

/// Minimal HTTP/1.1 server replaying one scripted response per connection.
pub struct ScriptedServer {
    pub base_url: String,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    task: JoinHandle<()>,
}

impl ScriptedServer {
    pub async fn start(responses: Vec<ScriptedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");
        let captured = Arc::new(Mutex::new(Vec::new()));
        let captured_for_server = Arc::clone(&captured);

        let task = tokio::spawn(async move {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let captured = Arc::clone(&captured_for_server);
                tokio::spawn(async move {
                    if let Ok(request) = read_http_request(&mut stream).await {
                        captured.lock().await.push(request);
                    }
                    let _ = write_response(&mut stream, &response).await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            captured,
            task,
        }
    }

    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().await.clone()
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn write_response(stream: &mut TcpStream, response: &ScriptedResponse) -> std::io::Result<()> {
    tokio::time::sleep(response.head_delay).await;
    let head = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: {}\r\nconnection: close\r\n\r\n",
        response.status,
        response.reason(),
        response.content_type
    );
    stream.write_all(head.as_bytes()).await?;
    stream.flush().await?;
    for part in &response.parts {
        tokio::time::sleep(response.part_delay).await;
        stream.write_all(part.as_bytes()).await?;
        stream.flush().await?;
    }
    if response.hold_open {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
    stream.shutdown().await
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.expect("header end should exist");
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}
