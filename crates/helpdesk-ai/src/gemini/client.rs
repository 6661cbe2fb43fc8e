//! Gemini API client struct, request building, and response parsing.

use crate::{AiError, AiTool, FunctionCall, GenerationOutcome, Role, Turn};

use super::config::GeminiConfig;

pub(crate) const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini API client.
pub struct GeminiClient {
    pub(crate) config: GeminiConfig,
    pub(crate) http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    pub(crate) fn api_url(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_API_BASE, self.config.model)
    }

    /// Build the JSON request body for the Gemini API.
    pub(crate) fn build_request_body(
        &self,
        transcript: &[Turn],
        tools: &[AiTool],
        system_instruction: Option<&str>,
    ) -> serde_json::Value {
        let contents: Vec<_> = transcript
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Model => "model",
                };
                serde_json::json!({
                    "role": role,
                    "parts": [{ "text": turn.text }]
                })
            })
            .collect();

        let instruction =
            system_instruction.unwrap_or(&self.config.default_system_instruction);

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": self.config.max_tokens,
                "temperature": self.config.temperature,
                "topK": self.config.top_k,
                "topP": self.config.top_p,
            },
            "systemInstruction": {
                "parts": [{ "text": instruction }]
            }
        });

        // Some backends reject an empty-but-present tools array, so the
        // key is omitted entirely when there are no tools.
        if !tools.is_empty() {
            body["tools"] = serde_json::json!([{
                "functionDeclarations": tools
            }]);
        }

        body
    }

    /// Parse a Gemini response into a generation outcome.
    pub(crate) fn parse_response(
        &self,
        json: serde_json::Value,
    ) -> Result<GenerationOutcome, AiError> {
        let parts = json["candidates"]
            .get(0)
            .and_then(|candidate| candidate["content"]["parts"].as_array())
            .cloned()
            .unwrap_or_default();

        let mut text = String::new();
        let mut function_calls = Vec::new();

        for part in &parts {
            if let Some(t) = part["text"].as_str() {
                text.push_str(t);
            }
            if let Some(fc) = part.get("functionCall") {
                function_calls.push(FunctionCall {
                    name: fc["name"].as_str().unwrap_or("").to_string(),
                    args: fc["args"].clone(),
                });
            }
        }

        Ok(GenerationOutcome::from_parts(text, function_calls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> GeminiClient {
        GeminiClient::new(GeminiConfig::new("test-key"))
    }

    #[test]
    fn body_omits_tools_key_when_no_tools() {
        let body = client().build_request_body(&[Turn::user("hi")], &[], None);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn body_wraps_tools_in_function_declarations() {
        let tools = vec![AiTool {
            name: "search_docs".into(),
            description: "Search the docs".into(),
            parameters: json!({"type": "object"}),
        }];
        let body = client().build_request_body(&[Turn::user("hi")], &tools, None);
        let declarations = &body["tools"][0]["functionDeclarations"];
        assert_eq!(declarations[0]["name"], "search_docs");
        assert_eq!(declarations[0]["parameters"]["type"], "object");
    }

    #[test]
    fn body_uses_default_system_instruction() {
        let body = client().build_request_body(&[Turn::user("hi")], &[], None);
        let instruction = body["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap();
        assert!(instruction.contains("customer support agent"));
    }

    #[test]
    fn body_uses_caller_system_instruction_when_given() {
        let body = client().build_request_body(&[Turn::user("hi")], &[], Some("Be terse."));
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be terse.");
    }

    #[test]
    fn body_maps_roles_and_generation_config() {
        let transcript = vec![Turn::user("question"), Turn::model("answer")];
        let body = client().build_request_body(&transcript, &[], None);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "answer");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
        assert_eq!(body["generationConfig"]["topK"], 40);
    }

    #[test]
    fn parse_text_response() {
        let outcome = client()
            .parse_response(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "Start by..."}]}
                }]
            }))
            .unwrap();
        assert_eq!(outcome, GenerationOutcome::Text("Start by...".into()));
    }

    #[test]
    fn parse_function_call_wins_over_text() {
        let outcome = client()
            .parse_response(json!({
                "candidates": [{
                    "content": {"parts": [
                        {"text": "I will look that up."},
                        {"functionCall": {"name": "search_docs", "args": {"q": "test case"}}}
                    ]}
                }]
            }))
            .unwrap();
        match outcome {
            GenerationOutcome::FunctionCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "search_docs");
                assert_eq!(calls[0].args["q"], "test case");
            }
            other => panic!("expected function calls, got {other:?}"),
        }
    }

    #[test]
    fn parse_missing_candidates_is_empty() {
        let outcome = client().parse_response(json!({})).unwrap();
        assert_eq!(outcome, GenerationOutcome::Empty);
    }
}
