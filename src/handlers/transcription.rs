//! OpenAI-compatible audio transcription endpoint.
//!
//! Accepts `multipart/form-data` with a required `file` field plus the
//! usual OpenAI parameters. `model`, `prompt`, and `temperature` are
//! accepted and ignored (one local model, greedy decoding only). The
//! filename extension is the container hint handed to the core.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::app_error::AppError;
use crate::state::AppState;

/// Maximum accepted upload size, matching OpenAI's 25 MB limit.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Simple transcription result
#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

/// Detailed transcription result with one whole-utterance segment
#[derive(Debug, Serialize)]
pub struct VerboseTranscriptionResponse {
    pub task: String,
    pub language: String,
    pub duration: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<Segment>,
}

/// Transcription segment with timing information
#[derive(Debug, Serialize)]
pub struct Segment {
    pub id: i64,
    pub seek: i64,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub tokens: Vec<i64>,
    pub temperature: f64,
    pub avg_logprob: f64,
    pub compression_ratio: f64,
    pub no_speech_prob: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseFormat {
    Json,
    Text,
    Srt,
    Vtt,
    VerboseJson,
}

impl ResponseFormat {
    /// Unknown or empty values fall back to plain JSON.
    fn parse(value: &str) -> Self {
        match value {
            "text" => ResponseFormat::Text,
            "srt" => ResponseFormat::Srt,
            "vtt" => ResponseFormat::Vtt,
            "verbose_json" => ResponseFormat::VerboseJson,
            _ => ResponseFormat::Json,
        }
    }
}

/// Handle `POST /v1/audio/transcriptions`.
pub async fn create_transcription(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut file_bytes = None;
    let mut file_name = String::new();
    let mut language = None;
    let mut response_format = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to parse form: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                file_name = field.file_name().unwrap_or("").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read audio file: {}", e)))?;
                file_bytes = Some(bytes);
            }
            "language" => {
                language = Some(read_text_field(field).await?);
            }
            "response_format" => {
                response_format = Some(read_text_field(field).await?);
            }
            // model, prompt, temperature: accepted for compatibility, ignored
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    let data = file_bytes
        .ok_or_else(|| AppError::BadRequest("Missing required parameter: 'file'".to_string()))?;

    let language = match language {
        Some(lang) if !lang.is_empty() => lang,
        _ => "en".to_string(),
    };
    let format = ResponseFormat::parse(response_format.as_deref().unwrap_or(""));
    let extension = file_extension(&file_name);

    info!(
        "Transcribing {} ({} bytes, language={}, format={:?})",
        file_name,
        data.len(),
        language,
        format
    );

    let transcriber = state.transcriber.clone();
    let payload = data.clone();
    let text = tokio::task::spawn_blocking(move || transcriber.transcribe(&payload, &extension))
        .await
        .map_err(|e| AppError::Internal(format!("transcription task failed: {}", e)))??;

    debug!("Transcription result: {}", text);

    // Approximate duration assuming 16 kHz 16-bit mono payload bytes.
    let duration = data.len() as f64 / (16000.0 * 2.0);

    Ok(render(format, text, language, duration))
}

/// Handle `POST /v1/audio/translations`.
///
/// The model is English-focused, so translation delegates to transcription.
pub async fn create_translation(
    state: State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    create_transcription(state, multipart).await
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to parse form: {}", e)))
}

/// Lowercased filename extension including the dot, or empty.
fn file_extension(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(idx) => file_name[idx..].to_ascii_lowercase(),
        None => String::new(),
    }
}

fn render(format: ResponseFormat, text: String, language: String, duration: f64) -> Response {
    match format {
        ResponseFormat::Json => Json(TranscriptionResponse { text }).into_response(),

        ResponseFormat::Text => {
            ([(header::CONTENT_TYPE, "text/plain")], text).into_response()
        }

        ResponseFormat::Srt => {
            let srt = format!("1\n00:00:00,000 --> {}\n{}\n", format_srt_time(duration), text);
            ([(header::CONTENT_TYPE, "text/plain")], srt).into_response()
        }

        ResponseFormat::Vtt => {
            let vtt = format!(
                "WEBVTT\n\n00:00:00.000 --> {}\n{}\n",
                format_vtt_time(duration),
                text
            );
            ([(header::CONTENT_TYPE, "text/vtt")], vtt).into_response()
        }

        ResponseFormat::VerboseJson => Json(VerboseTranscriptionResponse {
            task: "transcribe".to_string(),
            language,
            duration,
            text: text.clone(),
            segments: vec![Segment {
                id: 0,
                seek: 0,
                start: 0.0,
                end: duration,
                text,
                tokens: Vec::new(),
                temperature: 0.0,
                avg_logprob: -0.5,
                compression_ratio: 1.0,
                no_speech_prob: 0.0,
            }],
        })
        .into_response(),
    }
}

/// Format a duration as an SRT timestamp (`HH:MM:SS,mmm`).
fn format_srt_time(seconds: f64) -> String {
    let (hours, minutes, secs, millis) = split_time(seconds);
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Format a duration as a WebVTT timestamp (`HH:MM:SS.mmm`).
fn format_vtt_time(seconds: f64) -> String {
    let (hours, minutes, secs, millis) = split_time(seconds);
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

fn split_time(seconds: f64) -> (u64, u64, u64, u64) {
    let whole = seconds as u64;
    let hours = whole / 3600;
    let minutes = (whole % 3600) / 60;
    let secs = whole % 60;
    let millis = ((seconds - whole as f64) * 1000.0) as u64;
    (hours, minutes, secs, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_format_parsing() {
        assert_eq!(ResponseFormat::parse("json"), ResponseFormat::Json);
        assert_eq!(ResponseFormat::parse("text"), ResponseFormat::Text);
        assert_eq!(ResponseFormat::parse("srt"), ResponseFormat::Srt);
        assert_eq!(ResponseFormat::parse("vtt"), ResponseFormat::Vtt);
        assert_eq!(
            ResponseFormat::parse("verbose_json"),
            ResponseFormat::VerboseJson
        );
        // Unknown and empty fall back to json
        assert_eq!(ResponseFormat::parse(""), ResponseFormat::Json);
        assert_eq!(ResponseFormat::parse("yaml"), ResponseFormat::Json);
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("clip.wav"), ".wav");
        assert_eq!(file_extension("CLIP.WAV"), ".wav");
        assert_eq!(file_extension("a.b.mp3"), ".mp3");
        assert_eq!(file_extension("noext"), "");
        assert_eq!(file_extension(""), "");
    }

    #[test]
    fn test_srt_time_formatting() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(1.5), "00:00:01,500");
        assert_eq!(format_srt_time(61.25), "00:01:01,250");
        assert_eq!(format_srt_time(3661.0), "01:01:01,000");
    }

    #[test]
    fn test_vtt_time_formatting() {
        assert_eq!(format_vtt_time(0.0), "00:00:00.000");
        assert_eq!(format_vtt_time(90.001), "00:01:30.001");
    }

    #[test]
    fn test_verbose_json_shape() {
        let response = VerboseTranscriptionResponse {
            task: "transcribe".to_string(),
            language: "en".to_string(),
            duration: 2.0,
            text: "hello".to_string(),
            segments: vec![Segment {
                id: 0,
                seek: 0,
                start: 0.0,
                end: 2.0,
                text: "hello".to_string(),
                tokens: Vec::new(),
                temperature: 0.0,
                avg_logprob: -0.5,
                compression_ratio: 1.0,
                no_speech_prob: 0.0,
            }],
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["task"], "transcribe");
        assert_eq!(json["segments"][0]["end"], 2.0);
        assert_eq!(json["segments"][0]["avg_logprob"], -0.5);
    }

    #[test]
    fn test_verbose_json_omits_empty_segments() {
        let response = VerboseTranscriptionResponse {
            task: "transcribe".to_string(),
            language: "en".to_string(),
            duration: 0.0,
            text: String::new(),
            segments: Vec::new(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("segments").is_none());
    }
}
