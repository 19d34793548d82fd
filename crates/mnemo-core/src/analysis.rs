//! Content Analyzer
//!
//! The classify step of the insert path: keyword rules that derive topic
//! tags, an importance estimate, a coarse sentiment and an action type from
//! free text. English and Chinese keywords are both recognized.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::types::DEFAULT_IMPORTANCE;

// Lazy-initialized regex patterns
static PYTHON_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpython\b").expect("invalid regex"));

static AI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(ai|artificial intelligence|machine learning|deep learning)\b|人工智能|机器学习|深度学习")
        .expect("invalid regex")
});

static LANGCHAIN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blangchain\b").expect("invalid regex"));

static AGENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bagents?\b").expect("invalid regex"));

static MEMORY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(memory|memories|remember)\b|记忆|记住").expect("invalid regex")
});

static PROJECT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(project|task)s?\b|项目|任务").expect("invalid regex")
});

static DEVELOPMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(development|coding|programming)\b|开发|编程").expect("invalid regex")
});

static FRAMEWORK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(framework|library)\b|框架|库").expect("invalid regex")
});

static CRITICAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(critical|important)\b|重要|关键|核心").expect("invalid regex")
});

static SUCCESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(success|successful|successfully|completed?)\b|完成|成功|完毕")
        .expect("invalid regex")
});

static FAILURE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(error|errors|bug|bugs|failed|failure)\b|错误|失败|问题")
        .expect("invalid regex")
});

static OPTIMIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(optimi[sz]e|optimi[sz]ed|improve|improved)\b|优化|改进|提升")
        .expect("invalid regex")
});

static STUDY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(study|studied|research|analy[sz]e)\b|学习|研究|分析").expect("invalid regex")
});

const POSITIVE_WORDS: &[&str] = &[
    "好", "棒", "成功", "完成", "优秀", "满意", "great", "good", "success",
];
const NEGATIVE_WORDS: &[&str] = &[
    "问题", "错误", "失败", "困难", "bug", "error", "fail", "difficult",
];

const ACHIEVEMENT_WORDS: &[&str] = &[
    "完成", "实现", "做了", "创建", "completed", "implemented", "finished", "created", "shipped",
];
const PLAN_WORDS: &[&str] = &[
    "需要", "计划", "打算", "need to", "plan to", "going to", "todo",
];
const LEARNING_WORDS: &[&str] = &[
    "学到", "发现", "了解", "知道", "learned", "discovered", "found out", "realized",
];

/// Coarse sentiment of a piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

/// What the content describes doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Achievement,
    Plan,
    Learning,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Achievement => "achievement",
            Self::Plan => "plan",
            Self::Learning => "learning",
        }
    }
}

/// Result of analyzing one piece of content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub tags: Vec<String>,
    pub importance: f64,
    pub sentiment: Sentiment,
    pub action: Option<ActionType>,
}

/// Keyword-rule content analyzer
#[derive(Debug, Clone, Default)]
pub struct ContentAnalyzer;

impl ContentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, content: &str) -> Analysis {
        let lower = content.to_lowercase();
        Analysis {
            tags: self.tags(&lower),
            importance: self.importance(&lower),
            sentiment: self.sentiment(&lower),
            action: self.action(&lower),
        }
    }

    fn tags(&self, content: &str) -> Vec<String> {
        let rules: [(&str, &LazyLock<Regex>); 8] = [
            ("python", &PYTHON_PATTERN),
            ("ai", &AI_PATTERN),
            ("langchain", &LANGCHAIN_PATTERN),
            ("agent", &AGENT_PATTERN),
            ("memory", &MEMORY_PATTERN),
            ("project", &PROJECT_PATTERN),
            ("development", &DEVELOPMENT_PATTERN),
            ("framework", &FRAMEWORK_PATTERN),
        ];
        rules
            .iter()
            .filter(|(_, pattern)| pattern.is_match(content))
            .map(|(tag, _)| tag.to_string())
            .collect()
    }

    /// Base 0.5 plus one bonus per matching indicator group, capped at 1.0
    fn importance(&self, content: &str) -> f64 {
        let indicators: [(&LazyLock<Regex>, f64); 5] = [
            (&CRITICAL_PATTERN, 0.3),
            (&SUCCESS_PATTERN, 0.2),
            (&FAILURE_PATTERN, 0.2),
            (&OPTIMIZE_PATTERN, 0.1),
            (&STUDY_PATTERN, 0.1),
        ];
        let bonus: f64 = indicators
            .iter()
            .filter(|(pattern, _)| pattern.is_match(content))
            .map(|(_, weight)| weight)
            .sum();
        (DEFAULT_IMPORTANCE + bonus).min(1.0)
    }

    fn sentiment(&self, content: &str) -> Sentiment {
        let count = |words: &[&str]| words.iter().filter(|w| content.contains(*w)).count();
        let positive = count(POSITIVE_WORDS);
        let negative = count(NEGATIVE_WORDS);
        match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => Sentiment::Positive,
            std::cmp::Ordering::Less => Sentiment::Negative,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        }
    }

    fn action(&self, content: &str) -> Option<ActionType> {
        let any = |words: &[&str]| words.iter().any(|w| content.contains(*w));
        if any(ACHIEVEMENT_WORDS) {
            Some(ActionType::Achievement)
        } else if any(PLAN_WORDS) {
            Some(ActionType::Plan)
        } else if any(LEARNING_WORDS) {
            Some(ActionType::Learning)
        } else {
            None
        }
    }
}
