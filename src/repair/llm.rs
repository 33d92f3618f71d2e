//! LLM-backed repair over an OpenAI-compatible chat completions endpoint.

use crate::error::{ExecError, Result};
use crate::repair::RepairClient;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)```(?:[A-Za-z]*\n)?(.*?)```").expect("valid code fence pattern");
}

const SYSTEM_PROMPT: &str = "You fix BigQuery Standard SQL. Reply with the corrected query only, \
no explanation. The query must stay a single read-only SELECT statement.";

#[derive(Debug, Clone)]
pub struct LlmRepairConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmRepairConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gpt-4".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.0,
            max_tokens: 1000,
        }
    }

    /// Reads `OPENAI_API_KEY` (required), `OPENAI_MODEL` and `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ExecError::Config("OPENAI_API_KEY is not set".to_string()))?;
        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            config.model = model;
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        Ok(config)
    }
}

pub struct LlmRepairClient {
    config: LlmRepairConfig,
    client: Client,
}

impl LlmRepairClient {
    pub fn new(config: LlmRepairConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ExecError::Repair(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecError::Repair(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExecError::Repair(format!("LLM API returned {}: {}", status, text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ExecError::Repair(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ExecError::Repair("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl RepairClient for LlmRepairClient {
    async fn repair(&self, broken_sql: &str, error_message: &str) -> String {
        let prompt = repair_prompt(broken_sql, error_message);
        match self.call_llm(&prompt).await {
            Ok(content) => {
                let fixed = extract_sql(&content);
                if fixed.is_empty() {
                    warn!("Repair model returned no SQL, keeping the original query");
                    return broken_sql.to_string();
                }
                debug!("Repair model proposed: {}", fixed);
                fixed
            }
            Err(e) => {
                warn!("Query repair failed, keeping the original query: {}", e);
                broken_sql.to_string()
            }
        }
    }
}

fn repair_prompt(broken_sql: &str, error_message: &str) -> String {
    format!(
        "This query failed in BigQuery.\n\nQuery:\n{}\n\nError:\n{}\n\nReturn the corrected query.",
        broken_sql.trim(),
        error_message.trim()
    )
}

/// Strip markdown fences and surrounding whitespace from a model reply.
fn extract_sql(content: &str) -> String {
    let body = CODE_FENCE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(content);
    body.trim().trim_end_matches(';').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_sql_from_fenced_reply() {
        let reply = "Here you go:\n```sql\nSELECT month, COUNT(*) FROM t GROUP BY month;\n```\n";
        assert_eq!(extract_sql(reply), "SELECT month, COUNT(*) FROM t GROUP BY month");
    }

    #[test]
    fn test_extract_sql_plain_reply() {
        assert_eq!(extract_sql("  SELECT 1  \n"), "SELECT 1");
        assert_eq!(extract_sql("   "), "");
    }

    #[test]
    fn test_prompt_carries_query_and_error() {
        let prompt = repair_prompt("SELECT x FROM t", "Unrecognized name: x");
        assert!(prompt.contains("SELECT x FROM t"));
        assert!(prompt.contains("Unrecognized name: x"));
    }

    #[tokio::test]
    async fn test_unreachable_service_returns_input() {
        let mut config = LlmRepairConfig::new("test-key");
        config.base_url = "http://127.0.0.1:9".to_string();
        let client = LlmRepairClient::new(config).unwrap();
        let sql = "SELECT broken FROM t";
        assert_eq!(client.repair(sql, "Syntax error").await, sql);
    }
}
