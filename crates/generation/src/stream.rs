//! Server-sent event decoding for OpenAI-compatible streaming completions.

use serde::Deserialize;

#[derive(Deserialize, Debug)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

/// Incremental SSE decoder. Bytes may arrive split anywhere; only complete lines are parsed.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    buffer: String,
    text: String,
    done: bool,
}

impl SseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        while let Some(line_end) = self.buffer.find('\n') {
            let line = self.buffer[..line_end].trim().to_string();
            self.buffer.drain(..=line_end);
            self.consume_line(&line);
        }
    }

    fn consume_line(&mut self, line: &str) {
        if line.is_empty() || self.done {
            return;
        }
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return;
        }
        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => {
                for choice in chunk.choices.unwrap_or_default() {
                    if let Some(content) = choice.delta.and_then(|d| d.content) {
                        self.text.push_str(&content);
                    }
                }
            }
            Err(err) => log::debug!("Skipping undecodable SSE line: {err}"),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Flush a trailing line without newline and return the accumulated text.
    pub fn finish(mut self) -> String {
        let rest = std::mem::take(&mut self.buffer);
        self.consume_line(rest.trim());
        self.text
    }
}
