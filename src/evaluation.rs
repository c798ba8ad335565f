use crate::client::{Answerer, Judge};
use crate::models::{
    CategoryStatistics, DatasetItem, EvaluationRecord, ModelAnswer, RunOutcome, RunSummary,
    Verdict,
};
use indicatif::ProgressBar;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Category name used for records without one
const UNCATEGORIZED: &str = "uncategorized";

/// Sequential evaluation loop: answer, judge, record, pause
pub struct Evaluator<'a, A, J> {
    answerer: &'a A,
    judge: &'a J,
    /// Pause between consecutive items
    delay: Duration,
    progress: ProgressBar,
}

impl<'a, A: Answerer, J: Judge> Evaluator<'a, A, J> {
    pub fn new(answerer: &'a A, judge: &'a J, delay: Duration) -> Self {
        Self {
            answerer,
            judge,
            delay,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report per-item progress on the given bar
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Evaluate every item in order.
    ///
    /// Items with a blank question or reference answer are skipped. A failure
    /// on one item is recorded in its record and never stops the run.
    pub async fn run(&self, items: &[DatasetItem]) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        let total_items = items.len();

        for (index, item) in items.iter().enumerate() {
            if item.question.trim().is_empty() || item.answer.trim().is_empty() {
                debug!(id = %item.id, "Skipping item without question or reference answer");
                self.progress.inc(1);
                continue;
            }

            debug!(
                id = %item.id,
                "Evaluating item {}/{}",
                index + 1,
                total_items
            );
            let record = self.evaluate_item(item).await;
            outcome.total_score += u64::from(record.score());
            outcome.records.push(record);
            self.progress.inc(1);

            if index + 1 < total_items && !self.delay.is_zero() {
                sleep(self.delay).await;
            }
        }

        self.progress.finish();
        outcome
    }

    /// Answer and judge a single item, absorbing both kinds of failure
    pub async fn evaluate_item(&self, item: &DatasetItem) -> EvaluationRecord {
        let answer = match self.answerer.answer(&item.question).await {
            Ok(text) => ModelAnswer::Answered(text),
            Err(e) => {
                warn!(id = %item.id, error = %e, "Error getting response from model under test");
                ModelAnswer::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let verdict = match self
            .judge
            .judge(&item.question, &item.answer, answer.text())
            .await
        {
            Ok(judgement) => Verdict::Scored {
                score: judgement.score,
                justification: judgement.justification,
            },
            Err(e) => {
                warn!(id = %item.id, error = %e, "Error during judging");
                Verdict::Failed {
                    reason: e.to_string(),
                }
            }
        };

        EvaluationRecord::new(item, answer, verdict)
    }
}

/// Mean score over all records, judging failures counted as zero.
/// Returns `None` when there are no records.
pub fn average_score(outcome: &RunOutcome) -> Option<f64> {
    if outcome.records.is_empty() {
        return None;
    }
    Some(outcome.total_score as f64 / outcome.count() as f64)
}

/// Aggregate a finished run into the figures printed at the end
pub fn summarize(label: &str, outcome: &RunOutcome) -> RunSummary {
    let mut distribution = [0usize; 6];
    for record in &outcome.records {
        distribution[usize::from(record.score())] += 1;
    }

    RunSummary {
        label: label.to_string(),
        evaluated: outcome.count(),
        average_score: average_score(outcome),
        answer_failures: outcome
            .records
            .iter()
            .filter(|r| r.answer.is_failure())
            .count(),
        judge_failures: outcome
            .records
            .iter()
            .filter(|r| r.verdict.is_failure())
            .count(),
        distribution,
        categories: calculate_category_statistics(&outcome.records),
    }
}

/// Calculate mean, median and mode of the scores in each category
pub fn calculate_category_statistics(
    records: &[EvaluationRecord],
) -> BTreeMap<String, CategoryStatistics> {
    let mut by_category: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    for record in records {
        let category = record
            .category
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        by_category.entry(category).or_default().push(record.score());
    }

    by_category
        .into_iter()
        .map(|(category, scores)| {
            let stats = CategoryStatistics {
                count: scores.len(),
                mean: calculate_mean(&scores),
                median: calculate_median(&scores),
                mode: calculate_mode(&scores),
            };
            (category, stats)
        })
        .collect()
}

fn calculate_mean(scores: &[u8]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let sum: u64 = scores.iter().map(|&s| u64::from(s)).sum();
    sum as f64 / scores.len() as f64
}

fn calculate_median(scores: &[u8]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (f64::from(sorted[mid - 1]) + f64::from(sorted[mid])) / 2.0
    } else {
        f64::from(sorted[mid])
    }
}

/// Most frequent score, the lowest one on ties
fn calculate_mode(scores: &[u8]) -> u8 {
    let mut frequency: HashMap<u8, usize> = HashMap::new();
    for &score in scores {
        *frequency.entry(score).or_insert(0) += 1;
    }

    frequency
        .into_iter()
        .max_by(|(a_score, a_count), (b_score, b_count)| {
            a_count.cmp(b_count).then(b_score.cmp(a_score))
        })
        .map(|(score, _)| score)
        .unwrap_or(0)
}
