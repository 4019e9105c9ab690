use futures::StreamExt;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::provider::{
    DecodeChunkSnafu, EmptyMessageSetSnafu, HttpClientSnafu, InlineData, LlmProvider,
    MissingApiKeySnafu, Part, ProviderConfig, ProviderError, ProviderMessage, ProviderResult,
    ProviderStreamHandle, ProviderWorker, RemoteSnafu, Role, StatusSnafu, StreamEventMapped,
    StreamRequest, StreamTarget, make_event_stream,
};
use super::sse::SseDecoder;

pub const GEMINI_PROVIDER_ID: &str = "gemini";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-flash-lite-latest";

/// Streams replies from the Gemini `streamGenerateContent` endpoint.
pub struct GeminiProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(mut config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "gemini-provider-new",
                provider_id: config.provider_id.clone(),
            }
        );

        if config.endpoint.is_empty() {
            config.endpoint = DEFAULT_GEMINI_ENDPOINT.to_string();
        }

        let client = reqwest::Client::builder()
            .build()
            .context(HttpClientSnafu {
                stage: "build-client",
            })?;

        Ok(Self { config, client })
    }

    fn stream_url(endpoint: &str, model_id: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            endpoint.trim_end_matches('/'),
            model_id.trim()
        )
    }

    fn build_body(request: &StreamRequest) -> GenerateContentRequest {
        let contents = request
            .messages
            .iter()
            .map(WireContent::from_message)
            .filter(|content| !content.parts.is_empty())
            .collect();

        let system_instruction = request
            .system_instruction
            .as_ref()
            .filter(|instruction| !instruction.trim().is_empty())
            .map(|instruction| WireSystemInstruction {
                parts: vec![WirePart::Text {
                    text: instruction.clone(),
                }],
            });

        let generation_config = if request.temperature.is_some() || request.top_p.is_some() {
            Some(WireGenerationConfig {
                temperature: request.temperature,
                top_p: request.top_p,
            })
        } else {
            None
        };

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config,
        }
    }

    async fn open_stream(
        client: &reqwest::Client,
        config: &ProviderConfig,
        request: &StreamRequest,
    ) -> ProviderResult<reqwest::Response> {
        let body = Self::build_body(request);
        ensure!(
            !body.contents.is_empty(),
            EmptyMessageSetSnafu {
                stage: "open-stream-build-body",
                target: request.target,
            }
        );

        let response = client
            .post(Self::stream_url(&config.endpoint, &request.model_id))
            .header("x-goog-api-key", config.api_key.as_str())
            .json(&body)
            .send()
            .await
            .context(HttpClientSnafu {
                stage: "send-stream-request",
            })?;

        let status = response.status();
        if !status.is_success() {
            let payload = response.text().await.unwrap_or_default();
            return StatusSnafu {
                stage: "stream-http-status",
                status: status.as_u16(),
                message: extract_error_message(&payload),
            }
            .fail();
        }

        Ok(response)
    }

    fn emit_error_event(
        event_tx: &mpsc::UnboundedSender<StreamEventMapped>,
        target: StreamTarget,
        error: ProviderError,
    ) {
        let _ = event_tx.send(StreamEventMapped::error(target, error.to_string()));
    }

    /// Maps one decoded SSE payload into a delta; `Ok(None)` for chunks without text.
    fn map_payload(target: StreamTarget, payload: &str) -> ProviderResult<Option<StreamEventMapped>> {
        let chunk: GenerateContentChunk = serde_json::from_str(payload).context(DecodeChunkSnafu {
            stage: "decode-stream-chunk",
        })?;

        if let Some(error) = chunk.error {
            return RemoteSnafu {
                stage: "stream-chunk-error",
                message: error.describe(),
            }
            .fail();
        }

        let text = chunk.text();
        if text.is_empty() {
            return Ok(None);
        }

        Ok(Some(StreamEventMapped::delta(target, text)))
    }

    /// Forwards decoded payloads; returns false when the stream must stop.
    fn forward_payloads(
        target: StreamTarget,
        payloads: Vec<String>,
        event_tx: &mpsc::UnboundedSender<StreamEventMapped>,
    ) -> bool {
        for payload in payloads {
            match Self::map_payload(target, &payload) {
                Ok(Some(event)) => {
                    if event_tx.send(event).is_err() {
                        return false;
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        target = ?target,
                        error = %error,
                        "gemini stream emitted an unusable chunk"
                    );
                    Self::emit_error_event(event_tx, target, error);
                    return false;
                }
            }
        }

        true
    }

    async fn run_stream_worker(
        client: reqwest::Client,
        config: ProviderConfig,
        request: StreamRequest,
        event_tx: mpsc::UnboundedSender<StreamEventMapped>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let target = request.target;
        let opened = tokio::select! {
            _ = &mut cancel_rx => {
                tracing::debug!(target = ?target, "gemini stream cancelled before opening");
                return;
            }
            opened = Self::open_stream(&client, &config, &request) => opened,
        };

        let response = match opened {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(
                    target = ?target,
                    provider_id = %config.provider_id,
                    model_id = %request.model_id,
                    error = %error,
                    "failed to open provider stream"
                );
                Self::emit_error_event(&event_tx, target, error);
                return;
            }
        };

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    // Dropping the body stream closes the connection.
                    tracing::debug!(target = ?target, "provider stream cancelled");
                    return;
                }
                next_chunk = body.next() => {
                    match next_chunk {
                        Some(Ok(bytes)) => {
                            let payloads = decoder.push(&bytes);
                            if !Self::forward_payloads(target, payloads, &event_tx) {
                                return;
                            }
                        }
                        Some(Err(source)) => {
                            tracing::warn!(
                                target = ?target,
                                error = %source,
                                "provider stream failed mid-body"
                            );
                            let error = ProviderError::StreamChunk {
                                stage: "read-stream-chunk",
                                source,
                            };
                            Self::emit_error_event(&event_tx, target, error);
                            return;
                        }
                        None => break,
                    }
                }
            }
        }

        if !Self::forward_payloads(target, decoder.finish(), &event_tx) {
            return;
        }

        let _ = event_tx.send(StreamEventMapped::done(target));
    }
}

impl LlmProvider for GeminiProvider {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        "Google Gemini"
    }

    fn default_model(&self) -> &str {
        DEFAULT_GEMINI_MODEL
    }

    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "stream-chat",
                target: request.target,
            }
        );

        let (event_tx, stream, cancel_rx) = make_event_stream(request.target);
        let worker: ProviderWorker = Box::pin(Self::run_stream_worker(
            self.client.clone(),
            self.config.clone(),
            request,
            event_tx,
            cancel_rx,
        ));

        Ok(ProviderStreamHandle { stream, worker })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<WirePart>,
}

impl WireContent {
    fn from_message(message: &ProviderMessage) -> Self {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "model",
        };

        // The API rejects empty text parts; a content left with none is dropped
        // by `build_body`.
        let parts = message
            .parts
            .iter()
            .filter(|part| part.as_text().is_none_or(|text| !text.is_empty()))
            .map(WirePart::from_part)
            .collect();

        Self { role, parts }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: WireInlineData,
    },
}

impl WirePart {
    fn from_part(part: &Part) -> Self {
        match part {
            Part::Text(text) => Self::Text { text: text.clone() },
            Part::InlineData(InlineData { mime_type, data }) => Self::InlineData {
                inline_data: WireInlineData {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct WireSystemInstruction {
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

impl GenerateContentChunk {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|part| !part.thought)
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl ErrorBody {
    fn describe(&self) -> String {
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| "unknown provider error".to_string());
        match self.status.as_deref() {
            Some(status) if !status.is_empty() => format!("{status}: {message}"),
            _ => message,
        }
    }
}

/// Pulls the human-readable message out of a Google API error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| wrapper.error.describe())
        .unwrap_or_else(|_| body.trim().to_string())
}
