//! 由模型直接判断意图

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use super::{Classification, ClassificationContext, Intent, IntentClassifier};
use crate::{agents::prompts, error::ClassifierError, llm::ChatModel};

/// 解析失败或调用出错时的置信度
const FALLBACK_CONFIDENCE: f64 = 10.0;
const DEFAULT_CONFIDENCE: f64 = 50.0;

pub struct LlmIntentClassifier {
    llm: Arc<dyn ChatModel>,
}

impl LlmIntentClassifier {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(
        &self,
        message: &str,
        context: &ClassificationContext,
    ) -> Result<Classification> {
        if message.trim().is_empty() {
            return Ok(Classification::new(Intent::GeneralInquiry, 0.0));
        }

        let user_prompt = prompts::classification_prompt(message, &context.describe());
        let fallback = Classification::new(Intent::GeneralInquiry, FALLBACK_CONFIDENCE);
        let reply = match self.llm.complete_once(prompts::CLASSIFIER_PROMPT, &user_prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("意图分类调用失败: {}", e);
                return Ok(fallback);
            }
        };

        Ok(parse_classification(&reply).unwrap_or_else(|e| {
            warn!("意图分类结果无法解析: {}", e);
            fallback
        }))
    }
}

/// 依次尝试：整段JSON、```json代码块、包含 "intent" 的第一个平衡花括号对象
pub fn parse_classification(reply: &str) -> Result<Classification, ClassifierError> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(ClassifierError::EmptyResponse);
    }

    let value = serde_json::from_str::<Value>(reply)
        .ok()
        .filter(Value::is_object)
        .or_else(|| fenced_json(reply))
        .or_else(|| embedded_object(reply))
        .ok_or(ClassifierError::NoJson)?;

    let intent = value
        .get("intent")
        .and_then(Value::as_str)
        .ok_or(ClassifierError::MissingIntent)?;
    let intent = intent.parse::<Intent>().unwrap_or_else(|_| {
        warn!("未知意图 '{}'，按general_inquiry处理", intent);
        Intent::GeneralInquiry
    });
    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_CONFIDENCE);

    let mut classification = Classification::new(intent, confidence);
    classification.reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(classification)
}

fn fenced_json(text: &str) -> Option<Value> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    let end = after.find("```")?;
    serde_json::from_str::<Value>(after[..end].trim())
        .ok()
        .filter(Value::is_object)
}

/// 扫描平衡的花括号，跳过字符串内部的括号
fn embedded_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;

        for (i, &b) in bytes.iter().enumerate().skip(start) {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }

        let end = end?;
        let candidate = &text[start..=end];
        if candidate.contains("\"intent\"") {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Some(value);
            }
        }
        search_from = start + 1;
    }
    None
}
