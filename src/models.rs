use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Answer text recorded when the model under test could not be reached
pub const ANSWER_FAILURE_TEXT: &str = "Error: Could not generate a response.";

/// Score recorded when judging failed. Never produced by a successful verdict.
pub const JUDGE_FAILURE_SCORE: u8 = 0;

/// A validated question/answer pair from the benchmark dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub id: String,
    pub category: Option<String>,
    pub question: String,
    /// Ground-truth answer shipped with the dataset
    pub answer: String,
}

/// What the model under test produced for a question
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelAnswer {
    Answered(String),
    Failed { reason: String },
}

impl ModelAnswer {
    /// Text handed to the judge and written to the results file
    pub fn text(&self) -> &str {
        match self {
            ModelAnswer::Answered(text) => text,
            ModelAnswer::Failed { .. } => ANSWER_FAILURE_TEXT,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ModelAnswer::Failed { .. })
    }
}

/// Outcome of the judging step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// `score` is always within 1..=5
    Scored { score: u8, justification: String },
    Failed { reason: String },
}

impl Verdict {
    pub fn score(&self) -> u8 {
        match self {
            Verdict::Scored { score, .. } => *score,
            Verdict::Failed { .. } => JUDGE_FAILURE_SCORE,
        }
    }

    pub fn justification(&self) -> String {
        match self {
            Verdict::Scored { justification, .. } => justification.clone(),
            Verdict::Failed { reason } => {
                format!("An error occurred during evaluation: {}", reason)
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Verdict::Failed { .. })
    }
}

/// Score and justification returned by a successful judge call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub score: u8,
    pub justification: String,
}

/// One outcome row per evaluated dataset item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "RecordRow")]
pub struct EvaluationRecord {
    pub id: String,
    pub category: Option<String>,
    pub question: String,
    pub reference_answer: String,
    pub answer: ModelAnswer,
    pub verdict: Verdict,
}

impl EvaluationRecord {
    pub fn new(item: &DatasetItem, answer: ModelAnswer, verdict: Verdict) -> Self {
        Self {
            id: item.id.clone(),
            category: item.category.clone(),
            question: item.question.clone(),
            reference_answer: item.answer.clone(),
            answer,
            verdict,
        }
    }

    pub fn score(&self) -> u8 {
        self.verdict.score()
    }
}

/// Flat shape of a record in the results file
#[derive(Debug, Serialize)]
struct RecordRow {
    id: String,
    category: Option<String>,
    question: String,
    reference_answer: String,
    model_answer: String,
    judge_score: u8,
    judge_justification: String,
}

impl From<EvaluationRecord> for RecordRow {
    fn from(record: EvaluationRecord) -> Self {
        Self {
            model_answer: record.answer.text().to_string(),
            judge_score: record.verdict.score(),
            judge_justification: record.verdict.justification(),
            id: record.id,
            category: record.category,
            question: record.question,
            reference_answer: record.reference_answer,
        }
    }
}

/// Result of driving the evaluation loop over a dataset
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Records in dataset order
    pub records: Vec<EvaluationRecord>,
    /// Sum of scores, judging failures counted as zero
    pub total_score: u64,
}

impl RunOutcome {
    pub fn count(&self) -> usize {
        self.records.len()
    }
}

/// Score statistics for one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStatistics {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub mode: u8,
}

/// Aggregated figures printed at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub label: String,
    pub evaluated: usize,
    /// `None` when no record was produced
    pub average_score: Option<f64>,
    pub answer_failures: usize,
    pub judge_failures: usize,
    /// Number of records per score, index 0 holding judging failures
    pub distribution: [usize; 6],
    pub categories: BTreeMap<String, CategoryStatistics>,
}
