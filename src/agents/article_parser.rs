//! 从模型输出中解析文章
//!
//! 依次尝试四种格式，第一个解析出文章的格式生效：
//!
//! ```text
//! block    := "---ARTICLE START---" field* "---ARTICLE END---"
//! numbered := (DIGITS "." SP title NL body)+
//! heading  := ("#"{1,3} SP title NL body)+
//! labelled := (Capitalised-phrase ":" NL body)+
//! ```
//!
//! 后三种格式中正文不足50个字符的条目会被丢弃。解析不会失败，无匹配时返回空列表。

use regex::Regex;
use std::sync::LazyLock;

const BLOCK_START: &str = "---ARTICLE START---";
const BLOCK_END: &str = "---ARTICLE END---";
const MIN_BODY_CHARS: usize = 50;

static NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\.\s+(\S.*)$").unwrap());
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#{1,3}\s+(\S.*)$").unwrap());
static LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Z][A-Za-z0-9'&/\- ]{0,80}?)\s*:\s*$").unwrap()
});

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArticle {
    pub title: String,
    pub content: String,
}

/// 解析模型输出
pub fn parse_articles(text: &str) -> Vec<ParsedArticle> {
    let lines: Vec<&str> = text.lines().collect();

    let blocks = LineParser::new(&lines).blocks();
    if !blocks.is_empty() {
        return blocks;
    }

    for header in [&*NUMBERED, &*HEADING, &*LABELLED] {
        let articles = LineParser::new(&lines).sections(header);
        if !articles.is_empty() {
            return articles;
        }
    }
    Vec::new()
}

struct LineParser<'a> {
    lines: &'a [&'a str],
    pos: usize,
}

impl<'a> LineParser<'a> {
    fn new(lines: &'a [&'a str]) -> Self {
        Self { lines, pos: 0 }
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    fn next_line(&mut self) -> Option<&'a str> {
        let line = self.peek()?;
        self.pos += 1;
        Some(line)
    }

    /// block*
    fn blocks(mut self) -> Vec<ParsedArticle> {
        let mut articles = Vec::new();
        while let Some(line) = self.next_line() {
            if line.trim() != BLOCK_START {
                continue;
            }
            if let Some(article) = self.block_body() {
                articles.push(article);
            }
        }
        articles
    }

    /// START之后直到END的字段
    fn block_body(&mut self) -> Option<ParsedArticle> {
        let mut title: Option<String> = None;
        let mut content: Option<Vec<&str>> = None;

        while let Some(line) = self.peek() {
            let trimmed = line.trim();
            if trimmed == BLOCK_END {
                self.pos += 1;
                break;
            }
            if trimmed == BLOCK_START {
                // 未闭合的块，交给外层重新开始
                break;
            }
            self.pos += 1;

            if let Some(collected) = content.as_mut() {
                collected.push(line);
            } else if let Some(rest) = trimmed.strip_prefix("TITLE:") {
                title = Some(rest.trim().to_string());
            } else if let Some(rest) = trimmed.strip_prefix("CONTENT:") {
                content = Some(vec![rest.trim_start()]);
            }
        }

        let title = title.filter(|t| !t.is_empty())?;
        let content = content?.join("\n").trim().to_string();
        if content.is_empty() {
            return None;
        }
        Some(ParsedArticle { title, content })
    }

    /// (header NL body)+
    fn sections(mut self, header: &Regex) -> Vec<ParsedArticle> {
        let mut articles = Vec::new();
        // 第一个标题之前的内容忽略
        while self.peek().is_some_and(|line| !header.is_match(line)) {
            self.pos += 1;
        }

        while let Some(line) = self.next_line() {
            let Some(title) = header
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| clean_title(m.as_str()))
            else {
                continue;
            };

            let mut body = Vec::new();
            while let Some(next) = self.peek() {
                if header.is_match(next) {
                    break;
                }
                body.push(next);
                self.pos += 1;
            }

            let content = body.join("\n").trim().to_string();
            if !title.is_empty() && content.chars().count() >= MIN_BODY_CHARS {
                articles.push(ParsedArticle { title, content });
            }
        }
        articles
    }
}

fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '*' || c == '_' || c == '"')
        .trim_end_matches(':')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: &str = "This paragraph is comfortably longer than fifty characters in total.";

    #[test]
    fn test_block_format() {
        let text = format!(
            "Here you go:\n---ARTICLE START---\nTITLE: Knife Basics\nCONTENT: Hold the knife firmly.\nKeep it sharp.\n---ARTICLE END---\n\n---ARTICLE START---\nTITLE: Stocks\nCONTENT: {}\n---ARTICLE END---",
            LONG
        );
        let articles = parse_articles(&text);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "Knife Basics");
        assert_eq!(articles[0].content, "Hold the knife firmly.\nKeep it sharp.");
        assert_eq!(articles[1].content, LONG);
    }

    #[test]
    fn test_block_missing_field_is_skipped() {
        let text = "---ARTICLE START---\nTITLE: Only a title\n---ARTICLE END---\n---ARTICLE START---\nTITLE: Ok\nCONTENT: short is fine in blocks\n---ARTICLE END---";
        let articles = parse_articles(text);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Ok");
    }

    #[test]
    fn test_numbered_format() {
        let text = format!(
            "Plan:\n1. **Getting Started**\n{}\n2. Too Short\nshort body\n3. Advanced Topics\n{}",
            LONG, LONG
        );
        let articles = parse_articles(&text);
        assert_eq!(
            articles.iter().map(|a| a.title.as_str()).collect::<Vec<_>>(),
            vec!["Getting Started", "Advanced Topics"]
        );
    }

    #[test]
    fn test_heading_format() {
        let text = format!("# Overview\n{}\n\n### Details\n{}\n#### Not a header level", LONG, LONG);
        let articles = parse_articles(&text);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[1].title, "Details");
        assert!(articles[1].content.contains("#### Not a header level"));
    }

    #[test]
    fn test_labelled_format() {
        let text = format!("Introduction:\n{}\nBest Practices:\n{}", LONG, LONG);
        let articles = parse_articles(&text);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "Introduction");
        assert_eq!(articles[1].title, "Best Practices");
    }

    #[test]
    fn test_no_match_yields_empty() {
        assert!(parse_articles("").is_empty());
        assert!(parse_articles("just some words without structure").is_empty());
        assert!(parse_articles("---ARTICLE START---\nTITLE: dangling").is_empty());
    }

    #[test]
    fn test_arbitrary_input_never_panics() {
        let inputs = [
            "---ARTICLE END---\n---ARTICLE START---",
            "1.\n#\n:\n",
            "é:\nü\n# ñ\n1. 日本語のタイトル\n本文",
            "\n\n\n",
            "CONTENT: orphan\nTITLE: orphan",
        ];
        for input in inputs {
            let _ = parse_articles(input);
        }
    }
}
