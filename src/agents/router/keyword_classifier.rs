//! 基于句式、动词、名词与修饰词打分的意图分类

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::{Classification, ClassificationContext, Intent, IntentClassifier};

const PATTERN_SCORE: f64 = 40.0;
const VERB_SCORE: f64 = 15.0;
const VERB_CAP: f64 = 25.0;
const NOUN_SCORE: f64 = 10.0;
const NOUN_CAP: f64 = 20.0;
const MODIFIER_SCORE: f64 = 5.0;
const MODIFIER_CAP: f64 = 15.0;
const MAX_SCORE: f64 = PATTERN_SCORE + VERB_CAP + NOUN_CAP + MODIFIER_CAP;

/// 一个意图的语义特征
struct SemanticIntent {
    intent: Intent,
    action_verbs: &'static [&'static str],
    object_nouns: &'static [&'static str],
    modifiers: &'static [&'static str],
    sentence_patterns: Vec<Regex>,
    /// 1最高，3最低
    priority: u8,
    confidence_boost: f64,
}

impl SemanticIntent {
    fn score(&self, text: &str) -> f64 {
        let mut total = 0.0;

        if self.sentence_patterns.iter().any(|p| p.is_match(text)) {
            total += PATTERN_SCORE;
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        if self
            .action_verbs
            .iter()
            .any(|verb| words.iter().any(|word| word.contains(verb)))
        {
            total += VERB_SCORE.min(VERB_CAP);
        }

        let nouns = self.object_nouns.iter().filter(|n| text.contains(**n)).count() as f64;
        total += (nouns * NOUN_SCORE).min(NOUN_CAP);

        let modifiers = self.modifiers.iter().filter(|m| text.contains(**m)).count() as f64;
        total += (modifiers * MODIFIER_SCORE).min(MODIFIER_CAP);

        total *= (4.0 - f64::from(self.priority)) / 3.0;
        total / MAX_SCORE * 100.0
    }
}

fn patterns(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .filter_map(|source| Regex::new(&format!("(?i){}", source)).ok())
        .collect()
}

/// 关键词意图分类器
pub struct KeywordIntentClassifier {
    intents: Vec<SemanticIntent>,
}

impl Default for KeywordIntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        let intents = vec![
            SemanticIntent {
                intent: Intent::CreateContent,
                action_verbs: &[
                    "create", "add", "make", "build", "generate", "implement", "insert",
                    "produce", "develop", "establish", "form",
                ],
                object_nouns: &[
                    "content", "article", "articles", "category", "categories", "section",
                    "sections", "topic", "topics", "page", "pages", "item", "items",
                ],
                modifiers: &[
                    "new", "recommended", "suggested", "additional", "missing", "needed",
                    "required", "these", "those", "some", "more", "all",
                ],
                sentence_patterns: patterns(&[
                    r"(?:ok,?\s+)?(?:please\s+)?(?:can\s+you\s+)?(?:go\s+ahead\s+and\s+)?(create|add|make|implement|insert)",
                    r"(?:let'?s\s+)?(create|add|make|build)",
                    r"(?:i\s+(?:want|need|would like)\s+(?:to\s+)?(?:you\s+to\s+)?)(create|add|make)",
                    r"(?:could\s+you\s+(?:please\s+)?)(create|add|make|implement)",
                    r"(create|add|implement|make).*(?:content|article|category)",
                    r"(?:the\s+)?(recommended|suggested|missing|new).*(?:content|article|category)",
                ]),
                priority: 1,
                confidence_boost: 1.2,
            },
            SemanticIntent {
                intent: Intent::AnalyzeContentGaps,
                action_verbs: &[
                    "find", "identify", "locate", "discover", "detect", "analyze", "examine",
                    "review", "assess", "evaluate",
                ],
                object_nouns: &[
                    "gaps", "gap", "missing", "holes", "omissions", "deficiencies",
                    "shortcomings", "problems", "issues",
                ],
                modifiers: &[
                    "content", "article", "knowledge", "information", "data", "coverage", "areas",
                ],
                sentence_patterns: patterns(&[
                    r"(?:can\s+you\s+)?(?:please\s+)?(find|identify|locate|show).*(?:gaps|missing|holes)",
                    r"(?:what\s+(?:are\s+)?(?:the\s+)?)(gaps|missing|holes|problems)",
                    r"(?:where\s+(?:are\s+)?(?:the\s+)?)(gaps|missing|holes|deficiencies)",
                    r"(analyze|examine|review|assess).*(?:gaps|coverage|content)",
                    r"(?:tell\s+me\s+about\s+)?(?:content\s+)?(gaps|missing|deficiencies)",
                ]),
                priority: 1,
                confidence_boost: 1.1,
            },
            SemanticIntent {
                intent: Intent::RetrieveContent,
                action_verbs: &[
                    "show", "display", "list", "get", "fetch", "retrieve", "view", "see",
                    "browse", "explore",
                ],
                object_nouns: &[
                    "content", "articles", "categories", "sections", "topics", "hierarchy",
                    "structure", "tree", "outline",
                ],
                modifiers: &[
                    "all", "current", "existing", "available", "complete", "full", "entire",
                ],
                sentence_patterns: patterns(&[
                    r"(?:can\s+you\s+)?(?:please\s+)?(show|display|list|get).*(?:content|articles|categories)",
                    r"(?:i\s+(?:want|need|would like)\s+to\s+)(see|view|browse|explore)",
                    r"(?:what\s+(?:are\s+)?(?:the\s+)?(?:current\s+)?)(articles|categories|content)",
                    r"(show|display|list).*(?:me\s+)?(?:all\s+)?(?:the\s+)?(?:content|articles)",
                ]),
                priority: 2,
                confidence_boost: 1.0,
            },
            SemanticIntent {
                intent: Intent::SetKnowledgeBaseContext,
                action_verbs: &["use", "select", "switch", "change", "set", "choose", "pick"],
                object_nouns: &["kb", "knowledge", "base", "database", "collection"],
                modifiers: &["to", "number", "id"],
                sentence_patterns: patterns(&[
                    r"(use|select|switch|set).*(?:kb|knowledge.*base)",
                    r"(?:switch\s+to\s+|change\s+to\s+|use\s+)(kb|knowledge)",
                    r"(?:i\s+want\s+to\s+use\s+)(kb|knowledge)",
                ]),
                priority: 1,
                confidence_boost: 1.3,
            },
            SemanticIntent {
                intent: Intent::SetArticleContext,
                action_verbs: &["work", "focus", "select", "choose", "open"],
                object_nouns: &["article", "category", "section", "topic"],
                modifiers: &["on", "with", "main", "specific"],
                sentence_patterns: patterns(&[
                    r"(work|focus).*(?:on|with).*(?:article|category|section)",
                    r"(?:i\s+want\s+to\s+)(work|focus).*(?:on|with)",
                    r"(select|choose|open).*(?:article|category|section)",
                ]),
                priority: 2,
                confidence_boost: 1.1,
            },
            SemanticIntent {
                intent: Intent::RetrieveFilteredContent,
                action_verbs: &["show", "display", "list", "get"],
                object_nouns: &["articles", "content", "items"],
                modifiers: &["under", "in", "from", "within", "specific", "section"],
                sentence_patterns: patterns(&[
                    r"(show|display|list|get).*(?:articles|content).*(?:under|in|from|within)",
                    r"(?:articles|content).*(?:under|in|from|within)",
                    r"(?:show|list).*(?:specific|section)",
                ]),
                priority: 2,
                confidence_boost: 1.0,
            },
            SemanticIntent {
                intent: Intent::UpdateContent,
                action_verbs: &[
                    "update", "edit", "modify", "change", "revise", "alter", "adjust", "fix",
                    "correct",
                ],
                object_nouns: &[
                    "content", "article", "articles", "category", "section", "text", "information",
                ],
                modifiers: &["existing", "current", "this", "that", "the"],
                sentence_patterns: patterns(&[
                    r"(?:can\s+you\s+)?(?:please\s+)?(update|edit|modify|change).*(?:content|article)",
                    r"(?:i\s+(?:want|need)\s+to\s+)(update|edit|modify|change)",
                    r"(fix|correct|revise).*(?:content|article|text)",
                ]),
                priority: 2,
                confidence_boost: 1.0,
            },
            SemanticIntent {
                intent: Intent::SearchContent,
                action_verbs: &["search", "find", "look", "locate", "seek"],
                object_nouns: &["for", "content", "article", "information", "topic", "keyword"],
                modifiers: &["specific", "particular", "about", "related", "containing"],
                sentence_patterns: patterns(&[
                    r"(search|find|look).*(?:for|about|containing)",
                    r"(?:can\s+you\s+)?(?:help\s+me\s+)?(find|search|locate)",
                    r"(?:i\s+(?:am\s+)?(?:looking|searching)\s+for)",
                ]),
                priority: 2,
                confidence_boost: 1.0,
            },
            SemanticIntent {
                intent: Intent::GetConversationHistory,
                action_verbs: &["show", "get", "list", "display"],
                object_nouns: &[
                    "history", "conversation", "previous", "last", "recent", "questions",
                    "commands",
                ],
                modifiers: &["my", "our", "chat", "3", "few"],
                sentence_patterns: patterns(&[
                    r"(?:show|get|list).*(?:history|conversation|previous|last|recent)",
                    r"(?:my|our).*(?:history|conversation|questions|commands)",
                    r"(?:last|recent).*(?:questions|commands|3)",
                ]),
                priority: 2,
                confidence_boost: 1.0,
            },
            SemanticIntent {
                intent: Intent::GeneralInquiry,
                action_verbs: &["help", "explain", "tell", "describe", "clarify", "understand"],
                object_nouns: &["me", "how", "what", "why", "when", "where"],
                modifiers: &["can", "could", "would", "should", "please"],
                sentence_patterns: patterns(&[
                    r"(?:can\s+you\s+)?(?:please\s+)?(help|explain|tell|describe)",
                    r"(?:what\s+(?:is|are)|how\s+(?:do|does)|why\s+(?:is|are))",
                    r"(?:i\s+(?:don't\s+)?(?:understand|know|get))",
                ]),
                priority: 3,
                confidence_boost: 0.8,
            },
        ];
        Self { intents }
    }

    /// 同步打分，最高分胜出；没有任何特征命中时为 (general_inquiry, 0)
    pub fn score(&self, text: &str) -> Classification {
        let text = text.trim().to_lowercase();

        let best = self
            .intents
            .iter()
            .map(|intent| (intent, intent.score(&text)))
            .filter(|(_, score)| *score > 0.0)
            .fold(None::<(&SemanticIntent, f64)>, |best, candidate| match best {
                Some((_, best_score)) if best_score >= candidate.1 => best,
                _ => Some(candidate),
            });

        match best {
            Some((intent, raw)) => {
                let confidence = (raw * intent.confidence_boost).min(100.0);
                debug!("关键词分类: {} ({:.1})", intent.intent, confidence);
                Classification::new(intent.intent, confidence)
            }
            None => Classification::new(Intent::GeneralInquiry, 0.0),
        }
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(
        &self,
        message: &str,
        _context: &ClassificationContext,
    ) -> Result<Classification> {
        Ok(self.score(message))
    }
}
