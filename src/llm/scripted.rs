//! 按规则回复的对话模型，不访问网络

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

use super::ChatModel;

/// 一次调用的记录
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedCall {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// 预设回复的模型
///
/// 规则按添加顺序匹配：系统提示与用户提示中第一个包含 `needle` 的规则生效，
/// 都不匹配时返回默认回复。
#[derive(Debug, Default)]
pub struct ScriptedModel {
    rules: Vec<(String, String)>,
    default_reply: String,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedModel {
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            default_reply: default_reply.into(),
            ..Default::default()
        }
    }

    pub fn when(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), reply.into()));
        self
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    fn reply_for(&self, system_prompt: &str, user_prompt: &str) -> String {
        let haystack = format!("{}\n{}", system_prompt, user_prompt);
        self.rules
            .iter()
            .find(|(needle, _)| haystack.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ScriptedCall {
                system_prompt: system_prompt.to_string(),
                user_prompt: user_prompt.to_string(),
            });
        }
        Ok(self.reply_for(system_prompt, user_prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let model = ScriptedModel::new("fallback")
            .when("weather", "sunny")
            .when("weather today", "never reached");

        assert_eq!(model.complete("sys", "weather today?").await.unwrap(), "sunny");
        assert_eq!(model.complete("sys", "hi").await.unwrap(), "fallback");
        assert_eq!(model.call_count(), 2);
        assert_eq!(model.calls()[1].user_prompt, "hi");
    }

    #[tokio::test]
    async fn test_system_prompt_is_matched() {
        let model = ScriptedModel::new("").when("[reviewer]", "ok");
        assert_eq!(model.complete("[reviewer] you review", "text").await.unwrap(), "ok");
    }
}
