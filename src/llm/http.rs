//! HTTP plumbing shared by the providers: client setup, status handling
//! and Server-Sent Events framing.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::error::{GenerationError, GenerationResult};

pub fn build_client(timeout: Duration) -> GenerationResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GenerationError::Network(format!("Failed to create HTTP client: {}", e)))
}

/// Message to show for a failed response.
///
/// Providers put the reason in either a top-level `message` or in
/// `error.message`; anything else gets a generic status line.
pub fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.pointer("/error/message"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP error, status {}", status.as_u16()))
}

/// Send a request and fail on transport errors or non-2xx statuses.
pub async fn send_checked(request: RequestBuilder) -> GenerationResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| GenerationError::Network(format!("Request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body);
        tracing::warn!(%status, "provider returned an error: {}", message);
        return Err(GenerationError::Network(message));
    }
    Ok(response)
}

/// Send a request and decode the JSON body.
pub async fn post_json(request: RequestBuilder) -> GenerationResult<Value> {
    let response = send_checked(request).await?;
    let text = response
        .text()
        .await
        .map_err(|e| GenerationError::Network(format!("Failed to read response: {}", e)))?;
    serde_json::from_str(&text)
        .map_err(|e| GenerationError::response_format(format!("body is not JSON: {}", e)))
}

// --- Server-Sent Events ---

#[derive(Debug, PartialEq)]
pub enum SseLine<'a> {
    Data(&'a str),
    Done,
    Skip,
}

pub fn parse_sse_line(line: &str) -> SseLine<'_> {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        SseLine::Skip
    } else if data == "[DONE]" {
        SseLine::Done
    } else {
        SseLine::Data(data)
    }
}

/// Feed every `data:` payload of an event stream to `on_data`, in order.
///
/// Stops at `[DONE]` or when the body ends. Lines are split on raw bytes
/// so multi-byte characters cut across network chunks survive.
pub async fn for_each_sse_data<F>(response: Response, mut on_data: F) -> GenerationResult<()>
where
    F: FnMut(&str) -> GenerationResult<()>,
{
    let mut byte_stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = byte_stream.next().await {
        let bytes =
            chunk.map_err(|e| GenerationError::Network(format!("Stream read error: {}", e)))?;
        buffer.extend_from_slice(&bytes);

        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
            let line = String::from_utf8_lossy(&buffer[..pos]).into_owned();
            buffer.drain(..=pos);
            match parse_sse_line(line.trim_end_matches('\r')) {
                SseLine::Data(data) => on_data(data)?,
                SseLine::Done => return Ok(()),
                SseLine::Skip => {}
            }
        }
    }

    let rest = String::from_utf8_lossy(&buffer).into_owned();
    if let SseLine::Data(data) = parse_sse_line(rest.trim_end_matches('\r')) {
        on_data(data)?;
    }
    Ok(())
}
