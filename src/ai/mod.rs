//! AI stock-list generation. One capability only: turn a strategy prompt
//! into a list of ticker symbols via the selected chat platform. Calls
//! never error out of this module; any failure resolves to `None` and the
//! caller falls back to cached or keyword-bucketed lists.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};

use crate::storage::settings::SettingsRepo;

pub const AI_CACHE_CATEGORY: &str = "ai_cache";
pub const AI_CACHE_TTL_HOURS: i64 = 24;
const AI_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LIST_TOKENS: u32 = 500;

const SYSTEM_PROMPT: &str = "You are a financial analyst. Given an investment strategy prompt, \
provide a list of stock symbols (tickers) that match the criteria. \
Return ONLY a comma-separated list of stock symbols, nothing else. \
Example: AAPL, MSFT, GOOGL, AMZN, TSLA";

const COMMON_WORDS: &[&str] = &[
    "THE", "AND", "FOR", "WITH", "THIS", "THAT", "FROM", "HAVE", "WILL", "ARE", "NOT",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiPlatform {
    Claude,
    OpenAi,
    DeepSeek,
}

impl AiPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
        }
    }

    /// Unknown platform names fall back to the default platform.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" => Self::Claude,
            "openai" => Self::OpenAi,
            _ => Self::DeepSeek,
        }
    }

    fn key_setting(&self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::OpenAi => "OpenAI",
            Self::DeepSeek => "DeepSeek",
        }
    }
}

/// Deterministic cache key for a (prompt, platform) pair; the row lives in
/// the settings store under the `ai_cache` category.
pub fn cache_key(prompt: &str, platform: AiPlatform) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    let prefix = hex::encode(&digest[..8]);
    format!("ai_stock_list_cache_{}_{}", prefix, platform.as_str())
}

/// Cached payload stored in the setting row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedStockList {
    pub stock_list: Vec<String>,
    pub cached_at: chrono::DateTime<chrono::Utc>,
    pub cache_key: String,
}

#[async_trait]
pub trait StockListGenerator: Send + Sync {
    /// Raw platform response text, or None when the platform is
    /// unreachable, unauthorized, or returned nothing.
    async fn generate(&self, platform: AiPlatform, prompt: &str) -> Option<String>;
}

/// HTTPS client for the supported platforms. Credentials come from setting
/// rows named after the platform, JSON documents with a `key` field.
pub struct AiClient {
    http: reqwest::Client,
    settings: SettingsRepo,
}

impl AiClient {
    pub fn new(http: reqwest::Client, settings: SettingsRepo) -> Self {
        Self { http, settings }
    }

    async fn api_key(&self, platform: AiPlatform) -> Option<String> {
        match self.settings.api_key(platform.key_setting()).await {
            Ok(key) => key,
            Err(e) => {
                warn!(platform = platform.as_str(), error = %e, "could not read api key");
                None
            }
        }
    }

    async fn chat_completion(&self, base_url: &str, model: &str, key: &str, prompt: &str) -> Option<String> {
        let req = ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!(
                        "Based on this investment strategy: {prompt}\n\nProvide a list of stock symbols that match this strategy."
                    ),
                },
            ],
            temperature: Some(0.1),
            max_tokens: Some(MAX_LIST_TOKENS),
        };

        let resp = self
            .http
            .post(format!("{base_url}/chat/completions"))
            .timeout(AI_TIMEOUT)
            .bearer_auth(key)
            .json(&req)
            .send()
            .await
            .ok()?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet: String = body.chars().take(400).collect();
            warn!(status = status.as_u16(), snippet, "chat completion failed");
            return None;
        }

        let parsed: ChatResponse = serde_json::from_str(&body).ok()?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
    }

    async fn anthropic_message(&self, key: &str, prompt: &str) -> Option<String> {
        let req = AnthropicRequest {
            model: "claude-3-sonnet-20240229".to_string(),
            max_tokens: MAX_LIST_TOKENS,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: format!(
                    "Based on this investment strategy: {prompt}\n\nProvide a list of stock symbols that match this strategy."
                ),
            }],
        };

        let resp = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .timeout(AI_TIMEOUT)
            .header("x-api-key", key)
            .header("anthropic-version", "2023-06-01")
            .json(&req)
            .send()
            .await
            .ok()?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet: String = body.chars().take(400).collect();
            warn!(status = status.as_u16(), snippet, "anthropic message failed");
            return None;
        }

        let parsed: AnthropicResponse = serde_json::from_str(&body).ok()?;
        parsed.content.into_iter().find_map(|block| block.text)
    }
}

#[async_trait]
impl StockListGenerator for AiClient {
    async fn generate(&self, platform: AiPlatform, prompt: &str) -> Option<String> {
        let key = self.api_key(platform).await?;
        let response = match platform {
            AiPlatform::DeepSeek => {
                self.chat_completion("https://api.deepseek.com/v1", "deepseek-chat", &key, prompt)
                    .await
            }
            AiPlatform::OpenAi => {
                self.chat_completion("https://api.openai.com/v1", "gpt-4-turbo-preview", &key, prompt)
                    .await
            }
            AiPlatform::Claude => self.anthropic_message(&key, prompt).await,
        };
        if response.is_none() {
            debug!(platform = platform.as_str(), "no response from platform");
        }
        response
    }
}

fn is_valid_symbol(token: &str) -> bool {
    (1..=5).contains(&token.len())
        && token.bytes().all(|b| b.is_ascii_uppercase())
        && !COMMON_WORDS.contains(&token)
}

fn clean_token(raw: &str) -> &str {
    // Drop trailing annotations like "AAPL (Apple)" or "MSFT [tech]".
    let cut = raw.split(['(', '[']).next().unwrap_or(raw);
    cut.trim()
}

/// Extract ticker symbols from a platform response. Line-oriented parsing
/// first (bullets and labels stripped, delimiter split, blacklist), then a
/// whole-text uppercase-token scan when no line yields symbols.
pub fn parse_stock_symbols(response: &str) -> Vec<String> {
    const PREFIXES: &[&str] = &["Symbols:", "Stocks:", "Tickers:", "Recommendations:", "•", "-", "*"];

    for line in response.lines() {
        let mut line = line.trim();
        for prefix in PREFIXES {
            if let Some(rest) = line.strip_prefix(prefix) {
                line = rest.trim();
            }
        }
        if !line.chars().any(|c| c.is_ascii_uppercase()) {
            continue;
        }

        let symbols: Vec<String> = line
            .split([',', ';', '|', ' ', '\t'])
            .map(clean_token)
            .filter(|t| is_valid_symbol(t))
            .map(str::to_string)
            .collect();
        if !symbols.is_empty() {
            return symbols;
        }
    }

    // No line split cleanly: scan the whole text for standalone
    // 1-5 letter uppercase runs.
    let mut out = Vec::new();
    for word in response.split(|c: char| !c.is_ascii_alphabetic()) {
        if is_valid_symbol(word) {
            out.push(word.to_string());
        }
    }
    out
}

/// Keyword-bucketed default universe used when both AI generation and the
/// stored list come up empty.
pub fn fallback_stock_list(prompt: &str) -> Vec<String> {
    let p = prompt.to_lowercase();
    let list: &[&str] = if p.contains("tech") || p.contains("technology") {
        &["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META"]
    } else if p.contains("finance") || p.contains("bank") {
        &["JPM", "BAC", "WFC", "C", "GS", "MS"]
    } else if p.contains("health") || p.contains("pharma") {
        &["JNJ", "PFE", "MRK", "ABT", "UNH", "LLY"]
    } else if p.contains("energy") || p.contains("oil") {
        &["XOM", "CVX", "COP", "SLB", "EOG", "MPC"]
    } else if p.contains("consumer") || p.contains("retail") {
        &["WMT", "TGT", "COST", "HD", "LOW", "AMZN"]
    } else if p.contains("industrial") {
        &["CAT", "BA", "HON", "GE", "MMM", "UTX"]
    } else {
        &["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "NVDA", "META", "JPM", "V", "JNJ"]
    };
    list.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageOut>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_lists() {
        let symbols = parse_stock_symbols("AAPL, MSFT, GOOGL, AMZN");
        assert_eq!(symbols, vec!["AAPL", "MSFT", "GOOGL", "AMZN"]);
    }

    #[test]
    fn strips_labels_and_bullets() {
        assert_eq!(parse_stock_symbols("Symbols: NVDA, AMD"), vec!["NVDA", "AMD"]);
        assert_eq!(parse_stock_symbols("- TSLA | RIVN"), vec!["TSLA", "RIVN"]);
    }

    #[test]
    fn rejects_common_words_and_long_tokens() {
        let symbols = parse_stock_symbols("THE AND AAPL TOOLONGG MSFT");
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn drops_parenthetical_annotations() {
        let symbols = parse_stock_symbols("AAPL (Apple), MSFT [Microsoft]");
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn falls_back_to_whole_text_scan() {
        // Trailing periods defeat the delimiter split on every line, so the
        // whole-text uppercase-run scan has to find the tickers.
        let prose = "strong candidates include NVDA. and AMD.";
        assert_eq!(parse_stock_symbols(prose), vec!["NVDA", "AMD"]);
    }

    #[test]
    fn parsing_is_idempotent_under_normalization() {
        let first = parse_stock_symbols("Stocks: aapl?, MSFT, GOOGL and NVDA");
        let second = parse_stock_symbols(&first.join(", "));
        assert_eq!(first, second);
    }

    #[test]
    fn cache_key_is_deterministic_and_platform_scoped() {
        let a = cache_key("tech growth", AiPlatform::DeepSeek);
        let b = cache_key("tech growth", AiPlatform::DeepSeek);
        let c = cache_key("tech growth", AiPlatform::Claude);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("ai_stock_list_cache_"));
        assert!(a.ends_with("_deepseek"));
    }

    #[test]
    fn fallback_universe_buckets_by_keyword() {
        assert_eq!(fallback_stock_list("tech growth")[0], "AAPL");
        assert_eq!(fallback_stock_list("regional bank value")[0], "JPM");
        assert_eq!(fallback_stock_list("midcap oil services")[0], "XOM");
        assert_eq!(fallback_stock_list("anything else").len(), 10);
    }

    #[test]
    fn platform_parse_defaults_to_deepseek() {
        assert_eq!(AiPlatform::parse("claude"), AiPlatform::Claude);
        assert_eq!(AiPlatform::parse("OpenAI"), AiPlatform::OpenAi);
        assert_eq!(AiPlatform::parse("gemini"), AiPlatform::DeepSeek);
    }
}
