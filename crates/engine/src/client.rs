//! REST client for a single engine instance.

use std::time::Duration;

use reqwest::multipart;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use prism_compiler::PromptGraph;

use crate::EngineError;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(15);
const POLL_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP client for the engine's REST endpoints.
#[derive(Clone)]
pub struct EngineClient {
    client: reqwest::Client,
    base_url: String,
}

/// One output file recorded in the engine's history for a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Engine storage area the file landed in ("output", "temp", ...).
    #[serde(rename = "type")]
    pub kind: String,
}

/// Where a submitted prompt currently stands in the engine's history.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// No history entry yet, or the entry is not marked completed.
    Pending,
    /// The prompt finished; outputs collected across all graph nodes.
    Completed(Vec<OutputRef>),
    /// The engine executed the prompt and it failed there.
    Errored(String),
}

impl EngineClient {
    /// Create a client for the engine at `base_url`, e.g.
    /// `http://127.0.0.1:8188`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Upload an input image to the engine's input area.
    ///
    /// Sends `POST /upload/image` as multipart form data with
    /// `overwrite=true`. Returns the engine-assigned filename, which may
    /// differ from the requested one.
    pub async fn upload_asset(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<String, EngineError> {
        #[derive(Deserialize)]
        struct UploadResponse {
            name: String,
        }

        let part = multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = multipart::Form::new()
            .part("image", part)
            .text("overwrite", "true");

        let response = self
            .client
            .post(format!("{}/upload/image", self.base_url))
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::UploadFailed {
                status: status.as_u16(),
                body: read_body(response).await,
            });
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Protocol(format!("upload response: {e}")))?;
        Ok(parsed.name)
    }

    /// Submit a compiled prompt graph for execution.
    ///
    /// Sends `POST /prompt` with the graph and our client id. The engine
    /// sometimes answers `200 OK` with an `error` field instead of a
    /// proper status code, so the body is checked either way. Returns the
    /// engine-assigned prompt id.
    pub async fn submit_prompt(
        &self,
        graph: &PromptGraph,
        client_id: &str,
    ) -> Result<String, EngineError> {
        let body = serde_json::json!({
            "prompt": graph,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.base_url))
            .json(&body)
            .timeout(SUBMIT_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = read_body(response).await;
        // 5xx means the engine (or something in front of it) is choking,
        // not that the prompt is bad; leave those on the retry path.
        if status.is_server_error() {
            return Err(EngineError::Unavailable(format!("{status}: {body}")));
        }
        if !status.is_success() {
            return Err(EngineError::Rejected(body));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| EngineError::Protocol(format!("submit response: {e}")))?;
        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            return Err(EngineError::Rejected(error.to_string()));
        }
        value
            .get("prompt_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| EngineError::Protocol("submit response missing prompt_id".to_string()))
    }

    /// Check where a submitted prompt stands.
    ///
    /// Sends `GET /history/{prompt_id}`. The history is keyed by prompt
    /// id; a missing entry means the prompt has not finished executing.
    pub async fn poll_status(&self, prompt_id: &str) -> Result<PollStatus, EngineError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.base_url, prompt_id))
            .timeout(POLL_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;

        let history: Value = parse_json(response).await?;
        let Some(entry) = history.get(prompt_id) else {
            return Ok(PollStatus::Pending);
        };

        let status = &entry["status"];
        if status["status_str"].as_str() == Some("error") {
            return Ok(PollStatus::Errored(execution_error(status)));
        }
        if status["completed"].as_bool() != Some(true) {
            return Ok(PollStatus::Pending);
        }
        Ok(PollStatus::Completed(collect_outputs(&entry["outputs"])))
    }

    /// Download one output file.
    ///
    /// Sends `GET /view?filename=...&subfolder=...&type=...`.
    pub async fn fetch_output(&self, output: &OutputRef) -> Result<Vec<u8>, EngineError> {
        let response = self
            .client
            .get(format!("{}/view", self.base_url))
            .query(&[
                ("filename", output.filename.as_str()),
                ("subfolder", output.subfolder.as_str()),
                ("type", output.kind.as_str()),
            ])
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Api {
                status: status.as_u16(),
                body: read_body(response).await,
            });
        }
        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }

    /// Probe whether the engine is up. `/system_stats` is cheap to serve;
    /// anything other than a timely 2xx counts as down. Never errors.
    pub async fn health_check(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/system_stats", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;
        matches!(result, Ok(response) if response.status().is_success())
    }
}

// ---- response helpers ----

fn transport(error: reqwest::Error) -> EngineError {
    EngineError::Unavailable(error.to_string())
}

async fn read_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string())
}

async fn parse_json(response: reqwest::Response) -> Result<Value, EngineError> {
    let status = response.status();
    if !status.is_success() {
        return Err(EngineError::Api {
            status: status.as_u16(),
            body: read_body(response).await,
        });
    }
    response
        .json()
        .await
        .map_err(|e| EngineError::Protocol(e.to_string()))
}

/// Pull the exception message out of a failed history entry's status
/// messages, which are `[kind, data]` pairs.
fn execution_error(status: &Value) -> String {
    status["messages"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|m| {
            let pair = m.as_array()?;
            if pair.first()?.as_str()? != "execution_error" {
                return None;
            }
            pair.get(1)?["exception_message"].as_str().map(str::to_string)
        })
        .next()
        .unwrap_or_else(|| "engine reported an execution error".to_string())
}

/// Flatten per-node output lists (images, gifs, videos) into one list.
fn collect_outputs(outputs: &Value) -> Vec<OutputRef> {
    let mut refs = Vec::new();
    let Some(nodes) = outputs.as_object() else {
        return refs;
    };
    for node_outputs in nodes.values() {
        for list in ["images", "gifs", "videos"] {
            let Some(files) = node_outputs.get(list).and_then(Value::as_array) else {
                continue;
            };
            for file in files {
                if let Ok(output) = serde_json::from_value::<OutputRef>(file.clone()) {
                    refs.push(output);
                }
            }
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execution_error_extracts_exception_message() {
        let status = json!({
            "status_str": "error",
            "messages": [
                ["execution_start", {}],
                ["execution_error", {"exception_message": "CUDA out of memory"}]
            ]
        });
        assert_eq!(execution_error(&status), "CUDA out of memory");
    }

    #[test]
    fn execution_error_falls_back_without_messages() {
        let status = json!({"status_str": "error"});
        assert_eq!(execution_error(&status), "engine reported an execution error");
    }

    #[test]
    fn collect_outputs_flattens_all_nodes_and_lists() {
        let outputs = json!({
            "7": {"images": [
                {"filename": "a.png", "subfolder": "", "type": "output"},
                {"filename": "b.png", "subfolder": "batch", "type": "output"}
            ]},
            "20": {"gifs": [
                {"filename": "v.mp4", "subfolder": "", "type": "output"}
            ]}
        });
        let refs = collect_outputs(&outputs);
        assert_eq!(refs.len(), 3);
        assert!(refs.iter().any(|r| r.filename == "v.mp4"));
        assert!(refs.iter().any(|r| r.subfolder == "batch"));
    }

    #[test]
    fn collect_outputs_handles_empty_history() {
        assert!(collect_outputs(&json!({})).is_empty());
        assert!(collect_outputs(&json!(null)).is_empty());
    }

    #[test]
    fn output_ref_parses_wire_shape() {
        let output: OutputRef =
            serde_json::from_value(json!({"filename": "a.png", "type": "output"})).unwrap();
        assert_eq!(output.filename, "a.png");
        assert_eq!(output.subfolder, "");
        assert_eq!(output.kind, "output");
    }
}
