//! HTTP client and response parser for Gemini flight searches

use crate::config::ClientConfig;
use crate::prompt::build_prompt;
use crate::{Flight, FlightError, GroundingSource, SearchOutcome, SearchParams};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

/// Main flight client for asking Gemini to search flights
pub struct FlightClient {
    http_client: Client,
    config: ClientConfig,
    parser: FlightResponseParser,
}

impl FlightClient {
    /// Create a new flight client
    pub fn new(config: ClientConfig) -> Result<Self, FlightError> {
        debug!(model = %config.model, base_url = %config.base_url, "Creating new flight client");
        let http_client = Client::builder()
            .user_agent(concat!("flight-tracker/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http_client,
            config,
            parser: FlightResponseParser::new()?,
        })
    }

    /// Create a client configured from the environment
    pub fn from_env() -> Result<Self, FlightError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Ask the model for flights matching `params`
    #[instrument(
        level = "info",
        skip(self, params),
        fields(origin = %params.origin, destination = %params.destination, date = %params.departure_date)
    )]
    pub async fn get_flights(&self, params: &SearchParams) -> Result<SearchOutcome, FlightError> {
        let request = GenerateContentRequest::grounded(build_prompt(params));
        let url = self.config.generate_content_url();
        info!(url = %url, model = %self.config.model, "Sending flight search to Gemini");

        let start_time = std::time::Instant::now();
        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        info!(
            status = %status,
            duration_ms = start_time.elapsed().as_millis(),
            "Gemini request completed"
        );

        let body = response.text().await?;

        if !status.is_success() {
            let message = api_error_message(&body);
            error!(status = %status, message = %message, "Gemini request failed");
            return Err(FlightError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let result = self.parser.parse_response(&body);
        match &result {
            Ok(outcome) => info!(
                flights_found = outcome.flights.len(),
                sources = outcome.sources.len(),
                "Flight search completed"
            ),
            Err(e) => error!(error = %e, "Failed to parse Gemini response"),
        }
        result
    }
}

/// Parser for Gemini `generateContent` responses
pub struct FlightResponseParser {
    leading_fence: Regex,
    trailing_fence: Regex,
}

impl FlightResponseParser {
    pub fn new() -> Result<Self, FlightError> {
        Ok(Self {
            leading_fence: Regex::new(r"^```[A-Za-z]*[ \t]*\r?\n?")
                .map_err(|e| FlightError::ParseError(format!("Invalid fence pattern: {}", e)))?,
            trailing_fence: Regex::new(r"\r?\n?```\s*$")
                .map_err(|e| FlightError::ParseError(format!("Invalid fence pattern: {}", e)))?,
        })
    }

    /// Parse a raw `generateContent` response body.
    pub fn parse_response(&self, body: &str) -> Result<SearchOutcome, FlightError> {
        let response: GenerateContentResponse = serde_json::from_str(body)
            .map_err(|e| FlightError::ParseError(format!("Invalid Gemini response: {}", e)))?;

        let Some(candidate) = response.candidates.into_iter().next() else {
            warn!("Gemini returned no candidates");
            return Ok(SearchOutcome::default());
        };

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();
        let text = text.trim();

        if text.is_empty() {
            warn!("Gemini API returned an empty string");
            return Ok(SearchOutcome::default());
        }

        let sources = candidate
            .grounding_metadata
            .map(|metadata| extract_sources(metadata.grounding_chunks))
            .unwrap_or_default();

        let flights = self.parse_flights(text)?;
        debug!(flights = flights.len(), sources = sources.len(), "Parsed model output");

        Ok(SearchOutcome { flights, sources })
    }

    /// Parse the model's text into flights, tolerating a markdown code fence.
    pub fn parse_flights(&self, text: &str) -> Result<Vec<Flight>, FlightError> {
        let text = text.trim();
        let cleaned = self.leading_fence.replace(text, "");
        let cleaned = self.trailing_fence.replace(&cleaned, "");
        let cleaned = cleaned.trim();

        let records = match serde_json::from_str::<Vec<Value>>(cleaned) {
            Ok(records) => records,
            Err(e) => {
                // Prose around the array: retry on the outermost brackets
                match outer_array(cleaned).and_then(|array| serde_json::from_str::<Vec<Value>>(array).ok()) {
                    Some(records) => {
                        warn!("Model wrapped the flight array in extra text");
                        records
                    }
                    None => {
                        error!(error = %e, raw = %text, "Failed to parse JSON response from Gemini");
                        return Err(FlightError::ParseError(e.to_string()));
                    }
                }
            }
        };

        flights_from_records(records)
    }
}

/// Keeps every record that deserializes; one bad record does not sink the list.
fn flights_from_records(records: Vec<Value>) -> Result<Vec<Flight>, FlightError> {
    let mut flights = Vec::with_capacity(records.len());
    let mut last_error = None;

    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<Flight>(record) {
            Ok(flight) => flights.push(flight),
            Err(e) => {
                warn!(index, error = %e, "Dropping malformed flight record");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if flights.is_empty() => Err(FlightError::ParseError(format!(
            "no usable flight records: {}",
            e
        ))),
        _ => Ok(flights),
    }
}

fn outer_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (start < end).then(|| &text[start..=end])
}

fn extract_sources(chunks: Vec<GroundingChunk>) -> Vec<GroundingSource> {
    chunks
        .into_iter()
        .filter_map(|chunk| chunk.web)
        .filter_map(|web| match (web.uri, web.title) {
            (Some(uri), Some(title)) if !uri.is_empty() && !title.is_empty() => {
                Some(GroundingSource { uri, title })
            }
            _ => None,
        })
        .collect()
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    tools: Vec<Tool>,
}

impl GenerateContentRequest {
    /// Single user turn with Google Search grounding enabled.
    fn grounded(prompt: String) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            tools: vec![Tool {
                google_search: GoogleSearch {},
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}
