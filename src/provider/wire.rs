//! Request bodies for the four supported wire formats, plus the OAuth
//! envelope used by the code-assist endpoint.

use serde::Serialize;
use serde_json::Value;

/// Sampling temperature used for every translation request.
const TEMPERATURE: f32 = 0.3;

/// Output token ceiling for message-style requests, which require one.
const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Structural request/response family of a provider API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `{model, messages, temperature}` → `choices[0].message.content`
    ChatCompletions,
    /// `{contents, generationConfig, systemInstruction}` → `candidates[0].content.parts[0].text`
    GenerateContent,
    /// `{model, max_tokens, system, messages}` → `content[].text`
    Messages,
    /// `{model, input}` → `output[].content[].text`
    Responses,
}

impl WireFormat {
    /// Endpoint on a provider that speaks this format natively.
    pub fn endpoint(&self, base_url: &str, model: &str) -> String {
        match self {
            WireFormat::ChatCompletions => format!("{}/chat/completions", base_url),
            WireFormat::GenerateContent => {
                format!("{}/models/{}:generateContent", base_url, model)
            }
            WireFormat::Messages => format!("{}/messages", base_url),
            WireFormat::Responses => format!("{}/responses", base_url),
        }
    }

    /// Endpoint on a multi-format gateway, whose base URL carries no version path.
    pub fn gateway_endpoint(&self, base_url: &str, model: &str) -> String {
        match self {
            WireFormat::GenerateContent => {
                format!("{}/v1beta/models/{}:generateContent", base_url, model)
            }
            other => other.endpoint(&format!("{}/v1", base_url), model),
        }
    }

    /// Build the JSON request body for one (system, user) prompt pair.
    pub fn build_body(&self, model: &str, system_prompt: &str, user_prompt: &str) -> Value {
        let body = match self {
            WireFormat::ChatCompletions => serde_json::to_value(ChatRequest {
                model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: system_prompt,
                    },
                    ChatMessage {
                        role: "user",
                        content: user_prompt,
                    },
                ],
                temperature: TEMPERATURE,
            }),
            WireFormat::GenerateContent => serde_json::to_value(GenerateRequest {
                contents: vec![GenerateContent {
                    role: "user",
                    parts: vec![GeneratePart { text: user_prompt }],
                }],
                generation_config: GenerationConfig {
                    temperature: TEMPERATURE,
                },
                system_instruction: SystemInstruction {
                    parts: vec![GeneratePart {
                        text: system_prompt,
                    }],
                },
            }),
            WireFormat::Messages => serde_json::to_value(MessagesRequest {
                model,
                max_tokens: MAX_OUTPUT_TOKENS,
                system: system_prompt,
                messages: vec![ChatMessage {
                    role: "user",
                    content: user_prompt,
                }],
                temperature: TEMPERATURE,
            }),
            WireFormat::Responses => serde_json::to_value(ResponsesRequest {
                model,
                input: vec![
                    ChatMessage {
                        role: "system",
                        content: system_prompt,
                    },
                    ChatMessage {
                        role: "user",
                        content: user_prompt,
                    },
                ],
            }),
        };
        // Serializing plain structs of strings and numbers cannot fail.
        body.unwrap_or(Value::Null)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<GenerateContent<'a>>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction<'a>,
}

#[derive(Debug, Serialize)]
struct GenerateContent<'a> {
    role: &'a str,
    parts: Vec<GeneratePart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeneratePart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<GeneratePart<'a>>,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct CodeAssistEnvelope<'a> {
    model: &'a str,
    project: &'a str,
    request: Value,
}

/// Wrap a native-generation body in the code-assist `{model, project, request}` envelope.
pub fn wrap_envelope(model: &str, project: &str, request: Value) -> Value {
    serde_json::to_value(CodeAssistEnvelope {
        model,
        project,
        request,
    })
    .unwrap_or(Value::Null)
}

/// Unwrap a code-assist `{response: {...}}` body; anything else is returned unchanged.
pub fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.get("response").is_some_and(Value::is_object) => {
            map.remove("response").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_body_shape() {
        let body = WireFormat::ChatCompletions.build_body("gpt-4o-mini", "sys", "usr");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "sys");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "usr");
        assert!(body["temperature"].is_number());
    }

    #[test]
    fn test_generate_content_body_shape() {
        let body = WireFormat::GenerateContent.build_body("gemini-2.0-flash", "sys", "usr");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "usr");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert!(body["generationConfig"]["temperature"].is_number());
        assert!(body.get("model").is_none());
    }

    #[test]
    fn test_messages_body_shape() {
        let body = WireFormat::Messages.build_body("claude-3-5-sonnet-latest", "sys", "usr");
        assert_eq!(body["model"], "claude-3-5-sonnet-latest");
        assert_eq!(body["system"], "sys");
        assert_eq!(body["max_tokens"], 8192);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_responses_body_shape() {
        let body = WireFormat::Responses.build_body("gpt-4.1", "sys", "usr");
        assert_eq!(body["model"], "gpt-4.1");
        assert_eq!(body["input"][0]["content"], "sys");
        assert_eq!(body["input"][1]["content"], "usr");
    }

    #[test]
    fn test_native_endpoints() {
        let base = "https://api.example.com/v1";
        assert_eq!(
            WireFormat::ChatCompletions.endpoint(base, "m"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            WireFormat::GenerateContent.endpoint(base, "gemini-2.0-flash"),
            "https://api.example.com/v1/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(
            WireFormat::Messages.endpoint(base, "m"),
            "https://api.example.com/v1/messages"
        );
        assert_eq!(
            WireFormat::Responses.endpoint(base, "m"),
            "https://api.example.com/v1/responses"
        );
    }

    #[test]
    fn test_gateway_endpoints() {
        let base = "http://gateway.local";
        assert_eq!(
            WireFormat::GenerateContent.gateway_endpoint(base, "gemini-2.5-pro"),
            "http://gateway.local/v1beta/models/gemini-2.5-pro:generateContent"
        );
        assert_eq!(
            WireFormat::Messages.gateway_endpoint(base, "claude-x"),
            "http://gateway.local/v1/messages"
        );
        assert_eq!(
            WireFormat::ChatCompletions.gateway_endpoint(base, "qwen"),
            "http://gateway.local/v1/chat/completions"
        );
    }

    #[test]
    fn test_envelope_wrap_and_unwrap() {
        let inner = WireFormat::GenerateContent.build_body("gemini-2.5-flash", "s", "u");
        let wrapped = wrap_envelope("gemini-2.5-flash", "my-project", inner.clone());
        assert_eq!(wrapped["model"], "gemini-2.5-flash");
        assert_eq!(wrapped["project"], "my-project");
        assert_eq!(wrapped["request"], inner);

        let response = json!({"response": {"candidates": []}, "traceId": "abc"});
        assert_eq!(unwrap_envelope(response), json!({"candidates": []}));
    }

    #[test]
    fn test_unwrap_leaves_flat_response_string() {
        let body = json!({"response": "plain text"});
        assert_eq!(unwrap_envelope(body.clone()), body);
    }
}
