use crate::provider::{Intent, IntentClassifier};
use crate::wake::normalize;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Treats every utterance as a normal chat turn.
#[derive(Debug, Default)]
pub struct NoIntent;

#[async_trait]
impl IntentClassifier for NoIntent {
    async fn classify(&self, _text: &str) -> Result<Intent> {
        Ok(Intent::Continue)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeywordIntentParams {
    pub exit_phrases: Vec<String>,
}

impl Default for KeywordIntentParams {
    fn default() -> Self {
        Self {
            exit_phrases: vec!["退出".into(), "关闭".into(), "再见".into(), "goodbye".into()],
        }
    }
}

/// Recognizes the exit intent by phrase containment.
#[derive(Debug)]
pub struct KeywordIntent {
    exit_phrases: Vec<String>,
}

impl KeywordIntent {
    pub fn new(params: KeywordIntentParams) -> Self {
        let exit_phrases = params
            .exit_phrases
            .iter()
            .map(|p| normalize(p))
            .filter(|p| !p.is_empty())
            .collect();
        Self { exit_phrases }
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntent {
    async fn classify(&self, text: &str) -> Result<Intent> {
        let text = normalize(text);
        if self.exit_phrases.iter().any(|p| text.contains(p.as_str())) {
            Ok(Intent::Exit)
        } else {
            Ok(Intent::Continue)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keyword_intent_detects_exit_phrases() {
        let intent = KeywordIntent::new(KeywordIntentParams::default());

        assert_eq!(intent.classify("好的，再见！").await.unwrap(), Intent::Exit);
        assert_eq!(intent.classify("Goodbye.").await.unwrap(), Intent::Exit);
        assert_eq!(
            intent.classify("今天天气怎么样").await.unwrap(),
            Intent::Continue
        );
    }
}
