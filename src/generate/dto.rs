use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
}

/// `result` is the generated code serialized as a JSON string, which is
/// what the browser client parses.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub result: String,
}

/// Markup and stylesheet produced for one prompt. Both fields are always present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedCode {
    pub html: String,
    pub css: String,
}
