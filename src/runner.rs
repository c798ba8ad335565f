use crate::client::{Answerer, ChatJudge, Judge, ModelUnderTest};
use crate::config::{Config, DatasetSource};
use crate::dataset::{self, IngestReport};
use crate::evaluation::{Evaluator, summarize};
use crate::models::{DatasetItem, RunOutcome, RunSummary};
use crate::output::write_results;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// What a finished run hands back to the caller
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub results_path: PathBuf,
}

/// Main runner that orchestrates the evaluation process
pub struct Runner {
    config: Config,
    verbose: bool,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config, verbose: bool) -> Self {
        Self { config, verbose }
    }

    /// Run the whole pipeline against the configured endpoints
    pub async fn run(&self) -> Result<RunReport> {
        let answerer = ModelUnderTest::new(&self.config.test_model, &self.config.system_prompt);
        let judge = ChatJudge::new(&self.config.judge);
        self.run_with(&answerer, &judge).await
    }

    /// Load the dataset, evaluate every item and save the records.
    ///
    /// A dataset failure aborts before anything is evaluated or written.
    pub async fn run_with<A: Answerer, J: Judge>(
        &self,
        answerer: &A,
        judge: &J,
    ) -> Result<RunReport> {
        self.log_configuration();

        let items = self.load_dataset().await?;
        let outcome = self.evaluate(answerer, judge, &items).await;
        let summary = summarize(&self.config.label, &outcome);

        let results_path = self.config.results_path();
        write_results(&outcome.records, &results_path)?;

        Ok(RunReport {
            summary,
            results_path,
        })
    }

    fn log_configuration(&self) {
        info!(
            model = %self.config.judge.model,
            base_url = %self.config.judge.base_url,
            "Judge model"
        );
        info!(
            model = %self.config.test_model.model,
            base_url = %self.config.test_model.base_url,
            "Test model"
        );
        info!(label = %self.config.label, "Model under test label");
    }

    /// Load and validate dataset rows
    async fn load_dataset(&self) -> Result<Vec<DatasetItem>> {
        let description = describe_source(&self.config.dataset);
        info!("Loading dataset {}", description);

        let rows = dataset::load_rows(&self.config.dataset, self.config.limit)
            .await
            .inspect_err(|e| error!(error = %e, "Error loading dataset"))
            .with_context(|| format!("Failed to load dataset {}", description))?;

        let IngestReport { items, skipped } = dataset::ingest(rows);
        if skipped > 0 {
            warn!(skipped, "Skipped dataset rows without a question or reference answer");
        }
        info!(items = items.len(), "Successfully loaded dataset items");

        Ok(items)
    }

    /// Drive the evaluation loop with a progress bar
    async fn evaluate<A: Answerer, J: Judge>(
        &self,
        answerer: &A,
        judge: &J,
        items: &[DatasetItem],
    ) -> RunOutcome {
        let evaluator = Evaluator::new(answerer, judge, self.config.delay)
            .with_progress(self.progress_bar(items.len()));
        evaluator.run(items).await
    }

    /// Per-item progress bar; hidden in verbose mode where debug logs take over
    fn progress_bar(&self, len: usize) -> ProgressBar {
        if self.verbose {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("Evaluating");
        pb
    }
}

fn describe_source(source: &DatasetSource) -> String {
    match source {
        DatasetSource::Hub { name, split, .. } => format!("'{}' (split '{}')", name, split),
        DatasetSource::File(path) => format!("from {}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoint;
    use mockito::Matcher;
    use serde_json::{Value, json};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::{NamedTempFile, TempDir, tempdir};

    fn endpoint(base_url: &str, model: &str) -> Endpoint {
        Endpoint {
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
            model: model.to_string(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    fn create_test_config(base_url: &str, dataset: DatasetSource, output_dir: &TempDir) -> Config {
        Config {
            judge: endpoint(base_url, "judge-model"),
            test_model: endpoint(base_url, "test-model"),
            system_prompt: "You are a helpful assistant knowledgeable about Ugandan culture."
                .to_string(),
            label: "unit_test".to_string(),
            dataset,
            limit: None,
            delay: Duration::ZERO,
            output_dir: output_dir.path().to_path_buf(),
        }
    }

    fn dataset_file(rows: &[Value]) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".jsonl").unwrap();
        for row in rows {
            writeln!(file, "{}", row).unwrap();
        }
        file
    }

    fn completion_body(content: &str) -> String {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "m",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        let answer_mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({"model": "test-model"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("A type of food"))
            .expect(2)
            .create_async()
            .await;
        let judge_mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({
                "model": "judge-model",
                "response_format": {"type": "json_object"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body(
                r#"{"score":3,"justification":"Correct category, lacks cultural detail"}"#,
            ))
            .expect(2)
            .create_async()
            .await;

        let file = dataset_file(&[
            json!({"id": "1", "category": "Food", "question": "What is Luwombo?", "answer": "A traditional steamed dish..."}),
            json!({"id": "2", "category": "Food", "question": "", "answer": "skipped"}),
            json!({"id": "3", "category": "Food", "question": "What is Rolex?", "answer": "A chapati rolled with eggs"}),
        ]);
        let output_dir = tempdir().unwrap();
        let config = create_test_config(
            &server.url(),
            DatasetSource::File(file.path().to_path_buf()),
            &output_dir,
        );

        let report = Runner::new(config, true).run().await.unwrap();

        answer_mock.assert_async().await;
        judge_mock.assert_async().await;
        assert_eq!(report.summary.evaluated, 2);
        assert_eq!(report.summary.average_score, Some(3.0));
        assert_eq!(
            report.results_path,
            output_dir.path().join("evaluation_results_unit_test.json")
        );

        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(&report.results_path).unwrap()).unwrap();
        let saved = saved.as_array().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0]["id"], "1");
        assert_eq!(saved[0]["model_answer"], "A type of food");
        assert_eq!(saved[0]["judge_score"], 3);
        assert_eq!(
            saved[0]["judge_justification"],
            "Correct category, lacks cultural detail"
        );
        assert_eq!(saved[1]["id"], "3");
    }

    #[tokio::test]
    async fn test_run_absorbs_endpoint_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({"model": "test-model"})))
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"error": {"message": "Invalid API key", "type": "invalid_request_error", "param": null, "code": "invalid_api_key"}})
                    .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({"model": "judge-model"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("no json here"))
            .create_async()
            .await;

        let file = dataset_file(&[
            json!({"id": "1", "question": "Q1?", "answer": "A1"}),
            json!({"id": "2", "question": "Q2?", "answer": "A2"}),
        ]);
        let output_dir = tempdir().unwrap();
        let config = create_test_config(
            &server.url(),
            DatasetSource::File(file.path().to_path_buf()),
            &output_dir,
        );

        let report = Runner::new(config, true).run().await.unwrap();

        assert_eq!(report.summary.evaluated, 2);
        assert_eq!(report.summary.answer_failures, 2);
        assert_eq!(report.summary.judge_failures, 2);
        assert_eq!(report.summary.average_score, Some(0.0));

        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(&report.results_path).unwrap()).unwrap();
        for record in saved.as_array().unwrap() {
            assert_eq!(record["model_answer"], "Error: Could not generate a response.");
            assert_eq!(record["judge_score"], 0);
            assert!(!record["judge_justification"].as_str().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_dataset_failure_aborts_without_output() {
        let output_dir = tempdir().unwrap();
        let config = create_test_config(
            "http://127.0.0.1:9",
            DatasetSource::File(PathBuf::from("/nonexistent/uccb.jsonl")),
            &output_dir,
        );
        let results_path = config.results_path();

        let result = Runner::new(config, true).run().await;

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to load dataset")
        );
        assert!(!results_path.exists());
    }

    #[tokio::test]
    async fn test_empty_dataset_still_writes_results() {
        let file = dataset_file(&[json!({"id": "1", "question": "", "answer": ""})]);
        let output_dir = tempdir().unwrap();
        let config = create_test_config(
            "http://127.0.0.1:9",
            DatasetSource::File(file.path().to_path_buf()),
            &output_dir,
        );

        let report = Runner::new(config, true).run().await.unwrap();

        assert_eq!(report.summary.evaluated, 0);
        assert_eq!(report.summary.average_score, None);
        let saved = std::fs::read_to_string(&report.results_path).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&saved).unwrap(), json!([]));
    }

    #[tokio::test]
    async fn test_limit_caps_evaluated_items() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({"model": "test-model"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("answer"))
            .create_async()
            .await;
        server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({"model": "judge-model"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body(r#"{"score":4,"justification":"Good"}"#))
            .create_async()
            .await;

        let rows: Vec<Value> = (0..5)
            .map(|i| json!({"id": i, "question": format!("Q{}?", i), "answer": "A"}))
            .collect();
        let file = dataset_file(&rows);
        let output_dir = tempdir().unwrap();
        let mut config = create_test_config(
            &server.url(),
            DatasetSource::File(file.path().to_path_buf()),
            &output_dir,
        );
        config.limit = Some(2);

        let report = Runner::new(config, true).run().await.unwrap();
        assert_eq!(report.summary.evaluated, 2);
        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(&report.results_path).unwrap()).unwrap();
        assert_eq!(saved[1]["id"], "1");
    }

    #[test]
    fn test_describe_source() {
        let hub = DatasetSource::Hub {
            server_url: "https://datasets-server.huggingface.co".to_string(),
            name: "CraneAILabs/UCCB".to_string(),
            config: "default".to_string(),
            split: "test".to_string(),
            token: None,
        };
        assert_eq!(describe_source(&hub), "'CraneAILabs/UCCB' (split 'test')");
        assert_eq!(
            describe_source(&DatasetSource::File(PathBuf::from("uccb.json"))),
            "from uccb.json"
        );
    }
}
