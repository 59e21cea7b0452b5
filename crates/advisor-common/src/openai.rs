use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::completion::{CompletionBackend, FragmentStream};
use crate::error::CommonError;

/// Fixed sampling parameters applied to every completion request.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 1.0,
            top_p: 1.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OpenAiClientConfig {
    pub base_url: String,
    pub model: String,
    /// Bearer token read from the file named by `OPENAI_API_KEY_FILE`.
    pub api_key: Option<String>,
    /// Longest wait for a connection or for the next chunk of a response. The stream as a
    /// whole has no deadline, so long generations are not cut off while tokens keep arriving.
    pub idle_timeout: Duration,
    pub max_error_body_bytes: usize,
    pub sampling: SamplingParams,
}

impl OpenAiClientConfig {
    /// Load the client configuration from environment variables.
    ///
    /// All variables are optional:
    /// - `OPENAI_BASE_URL` (default `https://api.openai.com/v1`)
    /// - `OPENAI_MODEL` (default `gpt-4o-mini`)
    /// - `OPENAI_API_KEY_FILE`: path to a credential file holding the API key
    /// - `OPENAI_TIMEOUT_SECS`: idle bound between response chunks (default 120)
    /// - `OPENAI_MAX_TOKENS`, `OPENAI_TEMPERATURE`, `OPENAI_TOP_P`
    pub fn from_env() -> Result<Self, CommonError> {
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let api_key = match std::env::var_os("OPENAI_API_KEY_FILE") {
            Some(path) => Some(read_api_key(PathBuf::from(path))?),
            None => None,
        };

        let idle_timeout = std::env::var("OPENAI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(120));

        let max_error_body_bytes = std::env::var("OPENAI_MAX_ERROR_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8 * 1024);

        let defaults = SamplingParams::default();
        let sampling = SamplingParams {
            max_tokens: env_parse("OPENAI_MAX_TOKENS")?.unwrap_or(defaults.max_tokens),
            temperature: env_parse("OPENAI_TEMPERATURE")?.unwrap_or(defaults.temperature),
            top_p: env_parse("OPENAI_TOP_P")?.unwrap_or(defaults.top_p),
        };

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            idle_timeout,
            max_error_body_bytes,
            sampling,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, CommonError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| CommonError::Config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}

fn read_api_key(path: PathBuf) -> Result<String, CommonError> {
    let raw = std::fs::read_to_string(&path).map_err(|e| {
        CommonError::Credentials(format!("failed to read {}: {e}", path.display()))
    })?;
    let key = raw.trim();
    if key.is_empty() {
        return Err(CommonError::Credentials(format!(
            "credential file {} is empty",
            path.display()
        )));
    }
    Ok(key.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum OpenAiClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("upstream returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("upstream returned non-JSON error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// Constructed once by the binary and handed to whatever needs completions; there is no
/// process-global client.
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiClientConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiClientConfig) -> Result<Self, OpenAiClientError> {
        let http = reqwest::Client::builder()
            .user_agent("page-advisor")
            .connect_timeout(config.idle_timeout)
            .read_timeout(config.idle_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &OpenAiClientConfig {
        &self.config
    }

    /// Build the single-turn streaming request for `prompt`.
    pub fn single_turn_request(&self, prompt: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: Some(self.config.sampling.temperature),
            top_p: Some(self.config.sampling.top_p),
            max_tokens: Some(self.config.sampling.max_tokens),
            stream: Some(true),
        }
    }

    /// POST a streaming chat completion and expose the deltas as a fragment stream.
    ///
    /// The stream ends at `data: [DONE]` or when the body closes, whichever comes first.
    pub async fn chat_completions_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<FragmentStream, OpenAiClientError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let mut builder = self
            .http
            .post(&url)
            .json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await?;
        if !resp.status().is_success() {
            return Err(Self::to_upstream_error(resp, self.config.max_error_body_bytes).await);
        }
        debug!(model = %request.model, "completion stream opened");

        let state = StreamState {
            body: resp.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed(),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            finished: false,
        };

        let stream = futures::stream::unfold(state, |mut st| async move {
            loop {
                if let Some(fragment) = st.pending.pop_front() {
                    return Some((Ok(fragment), st));
                }
                if st.finished {
                    return None;
                }
                match st.body.next().await {
                    Some(Ok(chunk)) => {
                        let events = st.decoder.push(&chunk);
                        st.accept(events);
                    }
                    Some(Err(e)) => {
                        st.finished = true;
                        return Some((
                            Err(CommonError::from(OpenAiClientError::Request(e))),
                            st,
                        ));
                    }
                    None => {
                        let events = st.decoder.finish();
                        st.accept(events);
                        st.finished = true;
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn to_upstream_error(
        resp: reqwest::Response,
        max_error_body_bytes: usize,
    ) -> OpenAiClientError {
        let status = resp.status();
        let body = read_limited_text(resp, max_error_body_bytes).await;
        if let Ok(parsed) = serde_json::from_str::<OpenAiErrorEnvelope>(&body) {
            let message = parsed
                .error
                .message
                .unwrap_or_else(|| "unknown upstream error".to_string());
            return OpenAiClientError::Upstream { status, message };
        }
        OpenAiClientError::UpstreamBody { status, body }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream, CommonError> {
        let request = self.single_turn_request(prompt);
        Ok(self.chat_completions_stream(request).await?)
    }
}

struct StreamState {
    body: futures::stream::BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl StreamState {
    fn accept(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Done => {
                    self.finished = true;
                    return;
                }
                SseEvent::Data(data) => {
                    if let Some(piece) = delta_content(&data) {
                        self.pending.push_back(piece);
                    }
                }
            }
        }
    }
}

/// One `data:` payload from a server-sent event stream.
#[derive(Debug, PartialEq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Incremental server-sent-events splitter.
///
/// Bytes are buffered until a blank line closes an event, so multi-byte characters split
/// across network chunks decode intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));
        let mut events = Vec::new();
        while let Some(idx) = find_event_boundary(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..idx + 2).collect();
            parse_event(&String::from_utf8_lossy(&raw[..idx]), &mut events);
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            parse_event(&String::from_utf8_lossy(&raw), &mut events);
        }
        events
    }
}

fn find_event_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_event(event: &str, out: &mut Vec<SseEvent>) {
    for line in event.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("data:") else {
            continue;
        };
        let data = rest.trim();
        if data == "[DONE]" {
            out.push(SseEvent::Done);
        } else if !data.is_empty() {
            out.push(SseEvent::Data(data.to_string()));
        }
    }
}

fn delta_content(data: &str) -> Option<String> {
    match serde_json::from_str::<ChatCompletionStreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|s| !s.is_empty()),
        Err(e) => {
            warn!(error = %e, "skipping malformed stream chunk");
            None
        }
    }
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read upstream error body");
            "<failed to read error body>".to_string()
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiErrorObject,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorObject {
    message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionStreamChunk {
    choices: Vec<ChatCompletionStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionStreamChoice {
    delta: ChatCompletionStreamDelta,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionStreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> OpenAiClientConfig {
        OpenAiClientConfig {
            base_url,
            model: "test-model".to_string(),
            api_key: Some("secret".to_string()),
            idle_timeout: Duration::from_secs(5),
            max_error_body_bytes: 1024,
            sampling: SamplingParams::default(),
        }
    }

    fn sse_chunk(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": text } }] })
        )
    }

    #[test]
    fn decoder_splits_events_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let events = decoder.push(b":1}\n\ndata: [DONE]\n\n");
        assert_eq!(
            events,
            vec![SseEvent::Data("{\"a\":1}".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn decoder_handles_crlf_and_trailing_event() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: one\r\n\r\ndata: two");
        assert_eq!(events, vec![SseEvent::Data("one".to_string())]);
        assert_eq!(decoder.finish(), vec![SseEvent::Data("two".to_string())]);
    }

    #[test]
    fn delta_content_ignores_empty_and_malformed() {
        assert_eq!(
            delta_content(r#"{"choices":[{"delta":{"content":"hi"}}]}"#),
            Some("hi".to_string())
        );
        assert_eq!(delta_content(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#), None);
        assert_eq!(delta_content(r#"{"choices":[]}"#), None);
        assert_eq!(delta_content("not json"), None);
    }

    #[test]
    fn single_turn_request_uses_sampling_params() {
        let client = OpenAiClient::new(test_config("http://localhost".to_string())).unwrap();
        let req = client.single_turn_request("hello");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, "user");
        assert_eq!(req.max_tokens, Some(2048));
        assert_eq!(req.temperature, Some(1.0));
        assert_eq!(req.top_p, Some(1.0));
        assert_eq!(req.stream, Some(true));
    }

    #[tokio::test]
    async fn streams_fragments_in_order() {
        let server = MockServer::start().await;
        let body = format!("{}{}data: [DONE]\n\n", sse_chunk("Hello, "), sse_chunk("world"));
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({ "stream": true, "model": "test-model" })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri())).unwrap();
        let stream = client.generate_stream("prompt").await.unwrap();
        let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(fragments, vec!["Hello, ".to_string(), "world".to_string()]);
    }

    #[tokio::test]
    async fn stream_without_content_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("data: [DONE]\n\n", "text/event-stream"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri())).unwrap();
        let stream = client.generate_stream("prompt").await.unwrap();
        let fragments: Vec<_> = stream.collect().await;
        assert!(fragments.is_empty());
    }

    /// Serves one streaming response whose chunks arrive `gap` apart.
    async fn serve_slow_stream(fragments: Vec<String>, gap: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request: Vec<u8> = Vec::new();
            let mut buf = [0u8; 4096];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
                      transfer-encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();
            for fragment in fragments {
                tokio::time::sleep(gap).await;
                let chunk = sse_chunk(&fragment);
                let framed = format!("{:x}\r\n{chunk}\r\n", chunk.len());
                // The client may already have given up on a stalled stream
                if socket.write_all(framed.as_bytes()).await.is_err() {
                    return;
                }
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn slow_stream_outlives_idle_timeout() {
        let fragments: Vec<String> = (1..=5).map(|i| format!("part{i} ")).collect();
        let base_url = serve_slow_stream(fragments, Duration::from_millis(150)).await;

        let mut config = test_config(base_url);
        config.idle_timeout = Duration::from_millis(500);
        let client = OpenAiClient::new(config).unwrap();
        let stream = client.generate_stream("prompt").await.unwrap();
        let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(fragments.concat(), "part1 part2 part3 part4 part5 ");
    }

    #[tokio::test]
    async fn stalled_stream_hits_idle_timeout() {
        let base_url =
            serve_slow_stream(vec!["late".to_string()], Duration::from_millis(800)).await;

        let mut config = test_config(base_url);
        config.idle_timeout = Duration::from_millis(200);
        let client = OpenAiClient::new(config).unwrap();
        let result: Result<Vec<String>, CommonError> = match client.generate_stream("prompt").await {
            Ok(stream) => stream.try_collect().await,
            Err(e) => Err(e),
        };
        assert!(matches!(
            result,
            Err(CommonError::Completion(OpenAiClientError::Request(_)))
        ));
    }

    #[tokio::test]
    async fn upstream_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({ "error": { "message": "bad key" } })),
            )
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri())).unwrap();
        let err = client.generate_stream("prompt").await.err().unwrap();
        match err {
            CommonError::Completion(OpenAiClientError::Upstream { status, message }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(message, "bad key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
