//! Task Classifier
//!
//! Maps free-form task text to an execution [`Mode`] using three keyword
//! categories. Categories are checked in a fixed order (research, calculation,
//! creative) and each match overwrites the mode chosen so far, so the last
//! matching category wins:
//!
//! ```text
//! creative  ─► multi    (checked last, strongest)
//! calc      ─► single
//! research  ─► multi
//! nothing   ─► auto
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::agent::Mode;

/// Research-related keywords
pub const RESEARCH_KEYWORDS: &[&str] = &[
    "research",
    "find",
    "search",
    "look up",
    "investigate",
    "analyze",
    "study",
    "explore",
    "learn about",
];

/// Calculation-related keywords
pub const CALCULATION_KEYWORDS: &[&str] = &[
    "calculate",
    "compute",
    "solve",
    "evaluate",
    "what is",
    "how much",
    "add",
    "subtract",
    "multiply",
    "divide",
];

/// Creative-related keywords
pub const CREATIVE_KEYWORDS: &[&str] = &[
    "create", "generate", "write", "compose", "design", "develop", "make", "build", "draft",
];

/// A keyword category and the mode it selects
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskCategory {
    Research,
    Calculation,
    Creative,
}

impl TaskCategory {
    /// Evaluation order; later matches overwrite earlier ones
    pub const ORDER: [Self; 3] = [Self::Research, Self::Calculation, Self::Creative];

    pub const fn mode(self) -> Mode {
        match self {
            Self::Research | Self::Creative => Mode::Multi,
            Self::Calculation => Mode::Single,
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Self::Research => &RESEARCH,
            Self::Calculation => &CALCULATION,
            Self::Creative => &CREATIVE,
        }
    }

    /// Whether any keyword of this category appears as a whole word
    pub fn matches(self, task: &str) -> bool {
        self.pattern().is_match(task)
    }
}

fn keyword_pattern(keywords: &[&str]) -> Regex {
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("keyword pattern is valid")
}

static RESEARCH: LazyLock<Regex> = LazyLock::new(|| keyword_pattern(RESEARCH_KEYWORDS));
static CALCULATION: LazyLock<Regex> = LazyLock::new(|| keyword_pattern(CALCULATION_KEYWORDS));
static CREATIVE: LazyLock<Regex> = LazyLock::new(|| keyword_pattern(CREATIVE_KEYWORDS));

/// Deterministic text → mode mapper
#[derive(Clone, Copy, Debug, Default)]
pub struct TaskClassifier;

impl TaskClassifier {
    pub const fn new() -> Self {
        Self
    }

    /// Classify a task. Pure: the same text always yields the same mode.
    pub fn classify(&self, task: &str) -> Mode {
        let mut mode = Mode::Auto;
        for category in TaskCategory::ORDER {
            if category.matches(task) {
                mode = category.mode();
            }
        }
        tracing::debug!(%mode, "Classified task");
        mode
    }

    /// Categories whose keywords appear in the task, in evaluation order
    pub fn categories(&self, task: &str) -> Vec<TaskCategory> {
        TaskCategory::ORDER
            .into_iter()
            .filter(|c| c.matches(task))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(task: &str) -> Mode {
        TaskClassifier::new().classify(task)
    }

    #[test]
    fn test_default_is_auto() {
        assert_eq!(classify("hello there"), Mode::Auto);
        assert_eq!(classify(""), Mode::Auto);
    }

    #[test]
    fn test_single_categories() {
        assert_eq!(classify("calculate 2 + 2"), Mode::Single);
        assert_eq!(classify("Research quantum computing"), Mode::Multi);
        assert_eq!(classify("write a poem about autumn"), Mode::Multi);
        assert_eq!(classify("What is the capital of France?"), Mode::Single);
    }

    #[test]
    fn test_last_matching_category_wins() {
        // research then calculation: calculation wins
        assert_eq!(classify("find and compute the total"), Mode::Single);
        // calculation then creative: creative wins
        assert_eq!(classify("calculate the tip and write a note"), Mode::Multi);
    }

    #[test]
    fn test_word_boundaries() {
        // "address" contains "add", "findings" contains "find", "breakdown" has no keyword
        assert_eq!(classify("update my address"), Mode::Auto);
        assert_eq!(classify("summarize the findings"), Mode::Auto);
        assert_eq!(classify("LOOK UP the weather"), Mode::Multi);
    }

    #[test]
    fn test_deterministic() {
        let task = "Investigate how much it costs to build a shed";
        let first = classify(task);
        for _ in 0..10 {
            assert_eq!(classify(task), first);
        }
        assert_eq!(first, Mode::Multi);
        assert_eq!(
            TaskClassifier::new().categories(task),
            vec![TaskCategory::Research, TaskCategory::Calculation, TaskCategory::Creative]
        );
    }
}
