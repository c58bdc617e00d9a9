//! Instruction templates and response post-processing.

/// What a completion request is for; echo-style models answer differently per kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Code,
    Classify,
}

/// A single user message: a fixed instruction followed by the payload text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub kind: RequestKind,
    pub instruction: String,
    pub payload: String,
}

impl CompletionRequest {
    pub fn code(language: &str, text: &str) -> Self {
        Self {
            kind: RequestKind::Code,
            instruction: format!(
                "Return just the {language} code as plain text, no {} prefix, no explanation \
                 and no string characters decoration, for the following request: ",
                language.to_ascii_lowercase()
            ),
            payload: text.to_string(),
        }
    }

    /// Classification request; only the first `prefix_chars` characters of `text` are sent.
    pub fn classify(text: &str, prefix_chars: usize) -> Self {
        Self {
            kind: RequestKind::Classify,
            instruction: "Return only a boolean True or False, nothing else, about whether the \
                          text shown below is a prompt or part of a prompt:"
                .to_string(),
            payload: text.chars().take(prefix_chars).collect(),
        }
    }

    pub fn message_text(&self) -> String {
        format!("{}{}", self.instruction, self.payload)
    }
}

/// Strict boolean parse: trimmed, case-insensitive, exactly `true`. Everything else is false.
pub fn parse_strict_bool(response: &str) -> bool {
    response.trim().eq_ignore_ascii_case("true")
}

/// Remove a surrounding markdown fence if the model added one anyway.
pub fn strip_code_fence(response: &str) -> String {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return response.to_string();
    };
    let Some(body) = rest.strip_suffix("```") else {
        return response.to_string();
    };
    // drop the language tag on the opening fence line
    match body.split_once('\n') {
        Some((_tag, code)) => code.trim_end_matches('\n').to_string(),
        None => String::new(),
    }
}
