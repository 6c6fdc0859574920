//! Built-in Tools
//!
//! `calculate`, `datetime` and `direct_response`. Agents only see the ones
//! listed in `tools.enabled`.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::provider::{GenerationOptions, LlmProvider};
use crate::tool::{ParameterSchema, Tool, ToolCall, ToolRegistry, ToolResult, ToolSchema};

/// Register every built-in tool. `direct_response` uses the model in
/// `generation` at a creative temperature.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    provider: Arc<dyn LlmProvider>,
    generation: &GenerationOptions,
) {
    registry.register(DateTimeTool);
    registry.register(CalculatorTool);
    registry.register(DirectResponseTool::new(provider).with_options(GenerationOptions {
        temperature: CREATIVE_TEMPERATURE,
        system_prompt: None,
        ..generation.clone()
    }));
}

/// DateTime tool - returns current time
pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "datetime".into(),
            description: "Get the current date and time (UTC)".into(),
            parameters: vec![ParameterSchema::optional(
                "format",
                "string",
                "Output format: 'iso', 'human', or 'unix'",
            )],
        }
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let now = chrono::Utc::now();
        let output = match call.str_arg("format").unwrap_or("human") {
            "iso" => now.to_rfc3339(),
            "unix" => now.timestamp().to_string(),
            _ => now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string(),
        };

        ToolResult::success("datetime", output.clone()).with_data(json!({ "datetime": output }))
    }
}

/// Calculator tool - evaluates arithmetic expressions
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "calculate".into(),
            description: "Evaluate an arithmetic expression with + - * / ^ and parentheses".into(),
            parameters: vec![ParameterSchema::required(
                "expression",
                "string",
                "Expression to evaluate (e.g., '2 + 2', '(3 + 4) * 5')",
            )],
        }
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(expr) = call.str_arg("expression") else {
            return ToolResult::failure("calculate", "expression must be a string");
        };

        match evaluate_expression(expr) {
            Ok(value) => ToolResult::success("calculate", format!("{} = {value}", expr.trim()))
                .with_data(json!({ "result": value })),
            Err(e) => ToolResult::failure("calculate", e),
        }
    }
}

/// Deepest nesting of parentheses, signs and exponents accepted
const MAX_NESTING: usize = 64;

/// Recursive-descent evaluator over `+ - * / ^`, unary minus and parentheses
pub fn evaluate_expression(expr: &str) -> std::result::Result<f64, String> {
    if expr.trim().is_empty() {
        return Err("Empty expression".into());
    }
    let mut parser = Parser {
        chars: expr.chars().collect(),
        pos: 0,
        depth: 0,
    };

    let value = parser.sum()?;
    parser.skip_whitespace();
    if let Some(c) = parser.peek() {
        return Err(format!("Unexpected '{c}' at position {}", parser.pos));
    }
    if value.is_finite() {
        Ok(value)
    } else {
        Err("Result is not a finite number".into())
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> std::result::Result<T, String>,
    ) -> std::result::Result<T, String> {
        if self.depth >= MAX_NESTING {
            return Err("Expression nested too deeply".into());
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn sum(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.product()?;
        loop {
            if self.eat('+') {
                value += self.product()?;
            } else if self.eat('-') {
                value -= self.product()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn product(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.power()?;
        loop {
            if self.eat('*') {
                value *= self.power()?;
            } else if self.eat('/') {
                let divisor = self.power()?;
                if divisor == 0.0 {
                    return Err("Division by zero".into());
                }
                value /= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    // Right-associative: 2^3^2 = 2^9
    fn power(&mut self) -> std::result::Result<f64, String> {
        let base = self.unary()?;
        if self.eat('^') {
            Ok(base.powf(self.nested(Self::power)?))
        } else {
            Ok(base)
        }
    }

    fn unary(&mut self) -> std::result::Result<f64, String> {
        if self.eat('-') {
            Ok(-self.nested(Self::unary)?)
        } else if self.eat('+') {
            self.nested(Self::unary)
        } else {
            self.atom()
        }
    }

    fn atom(&mut self) -> std::result::Result<f64, String> {
        if self.eat('(') {
            let value = self.nested(Self::sum)?;
            if !self.eat(')') {
                return Err("Missing closing parenthesis".into());
            }
            return Ok(value);
        }

        self.skip_whitespace();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(match self.peek() {
                Some(c) => format!("Unexpected '{c}' at position {start}"),
                None => "Unexpected end of expression".into(),
            });
        }

        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|e| format!("Invalid number '{literal}': {e}"))
    }
}

const CREATIVE_TEMPERATURE: f32 = 0.7;

const CREATIVE_WORDS: &[&str] = &[
    "write", "compose", "create", "generate", "draft", "poem", "story", "essay", "article",
    "letter", "song", "lyrics", "script", "dialogue", "narrative", "fiction", "creative",
    "imagine", "fantasy",
];

static CREATIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", CREATIVE_WORDS.join("|")))
        .expect("creative word pattern is valid")
});

static TOPIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:about|on|regarding)\s+(\w+(?:\s+\w+)*)").expect("topic pattern is valid")
});

/// Kind of creative piece requested
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreativeKind {
    Poem,
    Story,
    Essay,
    Article,
    Letter,
    Song,
    Script,
    Dialogue,
    Text,
}

impl CreativeKind {
    /// First matching kind by substring, in a fixed order
    pub fn detect(prompt: &str) -> Self {
        let lower = prompt.to_lowercase();
        [
            ("poem", Self::Poem),
            ("story", Self::Story),
            ("essay", Self::Essay),
            ("article", Self::Article),
            ("letter", Self::Letter),
            ("song", Self::Song),
            ("lyrics", Self::Song),
            ("script", Self::Script),
            ("dialogue", Self::Dialogue),
        ]
        .into_iter()
        .find(|(word, _)| lower.contains(word))
        .map_or(Self::Text, |(_, kind)| kind)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Poem => "poem",
            Self::Story => "story",
            Self::Essay => "essay",
            Self::Article => "article",
            Self::Letter => "letter",
            Self::Song => "song",
            Self::Script => "script",
            Self::Dialogue => "dialogue",
            Self::Text => "creative text",
        }
    }

    fn instructions(self, topic: &str) -> String {
        match self {
            Self::Poem => format!("You are a skilled poet. Write a thoughtful poem about {topic}."),
            Self::Story => format!(
                "You are a talented storyteller. Write an engaging short story about {topic} with interesting characters and a clear plot."
            ),
            Self::Essay => format!(
                "You are an insightful essayist. Write an essay about {topic} that presents clear arguments and supports them."
            ),
            Self::Article => format!(
                "You are a professional journalist. Write an informative article about {topic}. Present facts clearly and objectively."
            ),
            Self::Letter => format!("You are a skilled letter writer. Write a heartfelt letter about {topic}."),
            Self::Song => format!("You are a talented songwriter. Write lyrics for a song about {topic}."),
            Self::Script => format!(
                "You are an experienced screenwriter. Write a script about {topic} with dialogue and stage directions."
            ),
            Self::Dialogue => format!(
                "You are a skilled dialogue writer. Write a dialogue about {topic} that flows naturally and reveals character."
            ),
            Self::Text => format!("You are a creative writer. Write an engaging piece about {topic}."),
        }
    }
}

/// Whether `prompt` asks for creative writing
pub fn is_creative_request(prompt: &str) -> bool {
    CREATIVE_PATTERN.is_match(prompt)
}

/// Topic following "about", "on" or "regarding", lowercased
pub fn extract_topic(prompt: &str) -> Option<String> {
    TOPIC_PATTERN
        .captures(prompt)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Generates creative writing through the model
pub struct DirectResponseTool {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl DirectResponseTool {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            options: GenerationOptions {
                temperature: CREATIVE_TEMPERATURE,
                ..GenerationOptions::default()
            },
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl Tool for DirectResponseTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "direct_response".into(),
            description: "Generates creative content like poems, stories, and other text".into(),
            parameters: vec![ParameterSchema::required(
                "prompt",
                "string",
                "The creative task to perform",
            )],
        }
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let prompt = call.str_arg("prompt").unwrap_or_default();
        if !is_creative_request(prompt) {
            return ToolResult::failure(
                "direct_response",
                "This doesn't seem to be a creative task. Please try a different tool.",
            );
        }

        let kind = CreativeKind::detect(prompt);
        let topic = extract_topic(prompt).unwrap_or_default();
        let options = self
            .options
            .clone()
            .with_system_prompt(kind.instructions(&topic));

        match self.provider.generate(prompt, &options).await {
            Ok(completion) => {
                let label = kind.label();
                let mut title = label.to_string();
                if let Some(first) = title.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                ToolResult::success("direct_response", format!("{title} generated successfully"))
                    .with_data(json!({ "type": label, "topic": topic, "content": completion.content }))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Creative generation failed");
                ToolResult::failure("direct_response", e.to_string())
            }
        }
    }
}
