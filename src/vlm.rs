//! Chat-completions client for the vision and text models, with streaming support.
//!
//! Provides robust model API communication with:
//! - Streaming responses (no total timeout, activity-based timeout)
//! - Non-streaming fallback for servers that ignore `stream: true`
//! - Connection health checks
//! - Progress callbacks for long-running analysis
//!
//! Requests are OpenAI-compatible and sent through `curl`, so any gateway that
//! speaks `/v1/chat/completions` works (llama.cpp, Ollama, LiteLLM, ...).
//!
//! # Configuration
//!
//! Settings come from [`crate::config`]:
//! - `STORY_VISION_LLM_ENDPOINT`: API endpoint URL
//! - `STORY_VISION_LLM_MODEL`: Model name
//! - `STORY_VISION_LLM_MAX_TOKENS`: Max tokens in response
//! - `STORY_VISION_LLM_TIMEOUT`: Activity timeout (seconds)
//! - `STORY_VISION_LLM_CONNECT_TIMEOUT`: Connection timeout (seconds)
//! - `STORY_VISION_LLM_API_KEY`: Optional bearer token

use base64::Engine;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config;

/// Result type for model operations
pub type VlmResult<T> = Result<T, VlmError>;

/// Errors that can occur while talking to the model endpoint
#[derive(Debug, Error)]
pub enum VlmError {
    /// Failed to connect to the endpoint
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// No activity for too long during streaming
    #[error("No response for {0:?}")]
    ActivityTimeout(Duration),
    /// Invalid response from the model
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the model client
#[derive(Debug, Clone)]
pub struct VlmConfig {
    /// API endpoint URL
    pub endpoint: String,
    /// Model name to use
    pub model: String,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Timeout for initial connection (seconds)
    pub connection_timeout: u64,
    /// Timeout for inactivity during streaming (seconds)
    pub activity_timeout: u64,
    /// Bearer token, if the endpoint needs one
    pub api_key: Option<String>,
}

impl Default for VlmConfig {
    fn default() -> Self {
        let cfg = config::get();
        Self {
            endpoint: cfg.llm.endpoint.clone(),
            model: cfg.llm.model.clone(),
            max_tokens: cfg.llm.max_tokens,
            connection_timeout: cfg.llm.connect_timeout,
            activity_timeout: cfg.llm.activity_timeout,
            api_key: cfg.llm.api_key.clone(),
        }
    }
}

impl VlmConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn activity_timeout(mut self, seconds: u64) -> Self {
        self.activity_timeout = seconds;
        self
    }

    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }
}

/// Progress update during a streaming request
#[derive(Debug, Clone)]
pub enum VlmProgress {
    /// Connection established
    Connected,
    /// Receiving data (partial content so far)
    Receiving(String),
    /// Request complete
    Complete(String),
}

/// One message in a chat-completions request
#[derive(Debug, Clone)]
pub enum ChatMessage {
    System(String),
    User(String),
    /// User turn carrying a PNG image followed by a text prompt
    UserWithImage { prompt: String, png: Vec<u8> },
}

impl ChatMessage {
    fn to_json(&self) -> serde_json::Value {
        match self {
            ChatMessage::System(text) => serde_json::json!({ "role": "system", "content": text }),
            ChatMessage::User(text) => serde_json::json!({ "role": "user", "content": text }),
            ChatMessage::UserWithImage { prompt, png } => {
                let img_base64 = base64::engine::general_purpose::STANDARD.encode(png);
                serde_json::json!({
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompt },
                        {
                            "type": "image_url",
                            "image_url": { "url": format!("data:image/png;base64,{}", img_base64) }
                        }
                    ]
                })
            }
        }
    }
}

/// Build the JSON body for a chat-completions request
pub fn build_request(config: &VlmConfig, messages: &[ChatMessage], stream: bool) -> serde_json::Value {
    let mut request = serde_json::json!({
        "model": config.model,
        "messages": messages.iter().map(ChatMessage::to_json).collect::<Vec<_>>(),
        "max_tokens": config.max_tokens,
    });
    if stream {
        request["stream"] = serde_json::Value::Bool(true);
    }
    request
}

/// Check if the endpoint is reachable (connection-only check).
///
/// Any HTTP status counts as reachable; only a failed connection does not.
pub fn check_health(endpoint: &str, timeout_secs: u64) -> VlmResult<bool> {
    let (scheme, url) = match endpoint.strip_prefix("https://") {
        Some(rest) => ("https", rest),
        None => ("http", endpoint.trim_start_matches("http://")),
    };
    let host_port = url.split('/').next().unwrap_or("127.0.0.1:8080");

    let output = Command::new("curl")
        .args([
            "-s",
            "-o", "/dev/null",
            "-w", "%{http_code}",
            "--connect-timeout", &timeout_secs.to_string(),
            "--max-time", &timeout_secs.to_string(),
            "-I",
            &format!("{}://{}", scheme, host_port),
        ])
        .output()?;

    let status = String::from_utf8_lossy(&output.stdout);
    // 000 means the connection failed entirely
    let code: u16 = status.trim().parse().unwrap_or(0);
    Ok(code > 0)
}

/// Analyze an image with the vision model using streaming to avoid timeouts
pub fn analyze_image(config: &VlmConfig, image_data: &[u8], prompt: &str) -> VlmResult<String> {
    let messages = [ChatMessage::UserWithImage {
        prompt: prompt.to_string(),
        png: image_data.to_vec(),
    }];
    chat(config, &messages, |_| {})
}

/// Send a text-only conversation and return the assistant reply
pub fn complete_text(config: &VlmConfig, system: Option<&str>, prompt: &str) -> VlmResult<String> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(ChatMessage::System(system.to_string()));
    }
    messages.push(ChatMessage::User(prompt.to_string()));
    chat(config, &messages, |_| {})
}

/// Send a conversation with progress callbacks
pub fn chat<F>(config: &VlmConfig, messages: &[ChatMessage], mut on_progress: F) -> VlmResult<String>
where
    F: FnMut(VlmProgress),
{
    let request = build_request(config, messages, true);
    let request_json = serde_json::to_string(&request)
        .map_err(|e| VlmError::InvalidResponse(e.to_string()))?;

    let mut child = spawn_with_body(curl_command(config, true), &request_json)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| VlmError::Io(std::io::Error::other("Failed to capture stdout")))?;

    let (tx, rx) = mpsc::channel();
    let activity_timeout = Duration::from_secs(config.activity_timeout);

    thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
    });

    on_progress(VlmProgress::Connected);

    let mut full_content = String::new();
    let mut last_activity = Instant::now();

    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Ok(line)) => {
                last_activity = Instant::now();
                match parse_stream_line(&line) {
                    StreamLine::Done => break,
                    StreamLine::Delta(content) => {
                        full_content.push_str(&content);
                        on_progress(VlmProgress::Receiving(full_content.clone()));
                    }
                    StreamLine::Ignored => {}
                }
            }
            Ok(Err(e)) => {
                let _ = child.kill();
                return Err(VlmError::Io(e));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if last_activity.elapsed() > activity_timeout {
                    let _ = child.kill();
                    return Err(VlmError::ActivityTimeout(activity_timeout));
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                break;
            }
        }
    }

    let status = child.wait()?;

    if !status.success() && full_content.is_empty() {
        return Err(VlmError::ConnectionFailed(format!(
            "curl exited with {} for {}",
            status, config.endpoint
        )));
    }

    if full_content.is_empty() {
        return chat_non_streaming(config, messages);
    }

    on_progress(VlmProgress::Complete(full_content.clone()));
    Ok(full_content)
}

/// Fallback non-streaming request (for APIs that don't support streaming)
fn chat_non_streaming(config: &VlmConfig, messages: &[ChatMessage]) -> VlmResult<String> {
    let request = build_request(config, messages, false);
    let request_json = serde_json::to_string(&request)
        .map_err(|e| VlmError::InvalidResponse(e.to_string()))?;

    let output = spawn_with_body(curl_command(config, false), &request_json)?.wait_with_output()?;

    if !output.status.success() {
        return Err(VlmError::ConnectionFailed(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }

    let response: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| VlmError::InvalidResponse(e.to_string()))?;

    extract_message_content(&response)
}

fn curl_command(config: &VlmConfig, stream: bool) -> Command {
    let mut command = Command::new("curl");
    command.arg("-s");
    if stream {
        command.arg("-N");
    }
    command.args([
        "-X", "POST",
        &config.endpoint,
        "-H", "Content-Type: application/json",
        "--connect-timeout", &config.connection_timeout.to_string(),
    ]);
    if let Some(key) = &config.api_key {
        command.args(["-H", &format!("Authorization: Bearer {}", key)]);
    }
    // Screenshot payloads exceed the per-argument limit, so the body goes over stdin
    command.args(["--data-binary", "@-"]);
    command
}

/// Spawn curl and feed the request body through its stdin
fn spawn_with_body(mut command: Command, body: &str) -> VlmResult<Child> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| VlmError::Io(std::io::Error::other("Failed to capture stdin")))?;
    stdin.write_all(body.as_bytes())?;
    drop(stdin);
    Ok(child)
}

/// One parsed line of a server-sent-events stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Delta(String),
    Done,
    Ignored,
}

/// Parse one SSE line from a streaming chat-completions response
pub fn parse_stream_line(line: &str) -> StreamLine {
    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return StreamLine::Ignored;
    };
    if data == "[DONE]" {
        return StreamLine::Done;
    }
    let Ok(json) = serde_json::from_str::<serde_json::Value>(data) else {
        return StreamLine::Ignored;
    };
    let delta = &json["choices"][0]["delta"];
    let mut content = String::new();
    if let Some(text) = delta["content"].as_str() {
        content.push_str(text);
    }
    if content.is_empty() {
        return StreamLine::Ignored;
    }
    StreamLine::Delta(content)
}

/// Pull the assistant text out of a non-streaming response
pub fn extract_message_content(response: &serde_json::Value) -> VlmResult<String> {
    if let Some(error) = response.get("error") {
        let message = error["message"].as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
        return Err(VlmError::InvalidResponse(message));
    }

    let message = &response["choices"][0]["message"];
    let content = message["content"].as_str().unwrap_or("");

    // Thinking models sometimes leave content empty
    let result = if content.is_empty() {
        message["reasoning_content"].as_str().unwrap_or("")
    } else {
        content
    };

    if result.is_empty() {
        return Err(VlmError::InvalidResponse("response has no message content".to_string()));
    }
    Ok(result.to_string())
}
