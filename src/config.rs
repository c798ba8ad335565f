use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_JUDGE_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_JUDGE_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEST_MODEL_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/";
pub const DEFAULT_TEST_MODEL_NAME: &str = "gemini-2.0-flash";
pub const DEFAULT_LABEL: &str = "gemini_2.0_flash_v1";
pub const DEFAULT_DATASET_NAME: &str = "CraneAILabs/UCCB";
pub const DEFAULT_DATASET_CONFIG: &str = "default";
pub const DEFAULT_DATASET_SPLIT: &str = "test";
pub const DEFAULT_DATASET_SERVER_URL: &str = "https://datasets-server.huggingface.co";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant knowledgeable about Ugandan culture.";

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    250
}

fn default_judge_temperature() -> f64 {
    0.7
}

fn default_delay_ms() -> u64 {
    1000
}

/// Command line and environment settings. Every flag can also come from the
/// environment variable named next to it.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigArgs {
    /// Optional TOML file with non-secret defaults
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// API key for the judge model (falls back to OPENAI_API_KEY)
    #[arg(long, env = "JUDGE_API_KEY", hide_env_values = true)]
    pub judge_api_key: Option<String>,

    /// Base URL of the judge's OpenAI-compatible API
    #[arg(long, env = "JUDGE_BASE_URL")]
    pub judge_base_url: Option<String>,

    /// Model used as the judge
    #[arg(long, env = "JUDGE_MODEL")]
    pub judge_model: Option<String>,

    /// API key for the model under test (falls back to the judge key)
    #[arg(long, env = "TEST_MODEL_API_KEY", hide_env_values = true)]
    pub test_model_api_key: Option<String>,

    /// Base URL of the model under test's OpenAI-compatible API
    #[arg(long, env = "TEST_MODEL_BASE_URL")]
    pub test_model_base_url: Option<String>,

    /// Model name sent to the model-under-test endpoint
    #[arg(long, env = "TEST_MODEL_NAME")]
    pub test_model_name: Option<String>,

    /// Label used in the results file name
    #[arg(long, env = "MODEL_UNDER_TEST_NAME")]
    pub label: Option<String>,

    /// Dataset repository on the Hugging Face Hub
    #[arg(long, env = "DATASET_NAME")]
    pub dataset_name: Option<String>,

    /// Dataset configuration (subset) name
    #[arg(long, env = "DATASET_CONFIG")]
    pub dataset_config: Option<String>,

    /// Dataset split to evaluate
    #[arg(long, env = "DATASET_SPLIT")]
    pub dataset_split: Option<String>,

    /// Base URL of the datasets-server rows API
    #[arg(long, env = "DATASET_SERVER_URL")]
    pub dataset_server_url: Option<String>,

    /// Hugging Face token for private datasets
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    /// Read the dataset from a local JSON array or JSON Lines file instead of the Hub
    #[arg(long, value_name = "PATH")]
    pub dataset_file: Option<PathBuf>,

    /// Evaluate only the first N dataset rows
    #[arg(long)]
    pub limit: Option<usize>,

    /// Pause between items in milliseconds
    #[arg(long, env = "EVAL_DELAY_MS")]
    pub delay_ms: Option<u64>,

    /// Directory the results file is written to
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

/// Non-secret settings read from an optional TOML file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FileConfig {
    pub judge_base_url: Option<String>,
    pub judge_model: Option<String>,
    #[serde(default = "default_judge_temperature")]
    pub judge_temperature: f64,
    pub test_model_base_url: Option<String>,
    pub test_model_name: Option<String>,
    /// Temperature for the model under test
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Maximum tokens for the model under test
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
    pub label: Option<String>,
    pub dataset_name: Option<String>,
    pub dataset_config: Option<String>,
    pub dataset_split: Option<String>,
    pub dataset_server_url: Option<String>,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    pub output_dir: Option<PathBuf>,
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn builtin() -> Self {
        Self {
            judge_temperature: default_judge_temperature(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            delay_ms: default_delay_ms(),
            ..Self::default()
        }
    }
}

/// An OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    /// `None` leaves the limit to the provider
    pub max_tokens: Option<u32>,
}

/// Where dataset rows come from
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetSource {
    Hub {
        server_url: String,
        name: String,
        config: String,
        split: String,
        token: Option<String>,
    },
    File(PathBuf),
}

/// Fully resolved settings for one evaluation run
#[derive(Debug, Clone)]
pub struct Config {
    pub judge: Endpoint,
    pub test_model: Endpoint,
    pub system_prompt: String,
    pub label: String,
    pub dataset: DatasetSource,
    pub limit: Option<usize>,
    pub delay: Duration,
    pub output_dir: PathBuf,
}

impl Config {
    /// Build the run configuration from process arguments and environment
    pub fn load(args: ConfigArgs) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::builtin(),
        };
        Self::resolve(args, file, |name| std::env::var(name).ok())
    }

    /// Merge the layers: arguments and environment first, then the file, then defaults
    pub fn resolve(
        args: ConfigArgs,
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let judge_api_key = args
            .judge_api_key
            .or_else(|| env("OPENAI_API_KEY"))
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingJudgeKey)?;

        let test_api_key = match args.test_model_api_key.filter(|key| !key.trim().is_empty()) {
            Some(key) => key,
            None => {
                warn!("TEST_MODEL_API_KEY not provided. Using the judge API key for the test model.");
                judge_api_key.clone()
            }
        };

        let judge = Endpoint {
            base_url: args
                .judge_base_url
                .or(file.judge_base_url)
                .unwrap_or_else(|| DEFAULT_JUDGE_BASE_URL.to_string()),
            api_key: judge_api_key,
            model: args
                .judge_model
                .or(file.judge_model)
                .unwrap_or_else(|| DEFAULT_JUDGE_MODEL.to_string()),
            temperature: file.judge_temperature,
            max_tokens: None,
        };

        let test_model = Endpoint {
            base_url: args
                .test_model_base_url
                .or(file.test_model_base_url)
                .unwrap_or_else(|| DEFAULT_TEST_MODEL_BASE_URL.to_string()),
            api_key: test_api_key,
            model: args
                .test_model_name
                .or(file.test_model_name)
                .unwrap_or_else(|| DEFAULT_TEST_MODEL_NAME.to_string()),
            temperature: file.temperature,
            max_tokens: Some(file.max_tokens),
        };

        let dataset = match args.dataset_file {
            Some(path) => DatasetSource::File(path),
            None => DatasetSource::Hub {
                server_url: args
                    .dataset_server_url
                    .or(file.dataset_server_url)
                    .unwrap_or_else(|| DEFAULT_DATASET_SERVER_URL.to_string()),
                name: args
                    .dataset_name
                    .or(file.dataset_name)
                    .unwrap_or_else(|| DEFAULT_DATASET_NAME.to_string()),
                config: args
                    .dataset_config
                    .or(file.dataset_config)
                    .unwrap_or_else(|| DEFAULT_DATASET_CONFIG.to_string()),
                split: args
                    .dataset_split
                    .or(file.dataset_split)
                    .unwrap_or_else(|| DEFAULT_DATASET_SPLIT.to_string()),
                token: args.hf_token.filter(|token| !token.is_empty()),
            },
        };

        Ok(Self {
            judge,
            test_model,
            system_prompt: file
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            label: args
                .label
                .or(file.label)
                .unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            dataset,
            limit: args.limit,
            delay: Duration::from_millis(args.delay_ms.unwrap_or(file.delay_ms)),
            output_dir: args
                .output_dir
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }

    /// Path of the results file, `evaluation_results_<label>.json`
    pub fn results_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("evaluation_results_{}.json", self.label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn args_with_judge_key() -> ConfigArgs {
        ConfigArgs {
            judge_api_key: Some("judge-key".to_string()),
            ..ConfigArgs::default()
        }
    }

    #[test]
    fn test_missing_judge_key_is_fatal() {
        let result = Config::resolve(ConfigArgs::default(), FileConfig::builtin(), no_env);
        assert!(matches!(result, Err(ConfigError::MissingJudgeKey)));
    }

    #[test]
    fn test_blank_judge_key_is_fatal() {
        let args = ConfigArgs {
            judge_api_key: Some("  ".to_string()),
            ..ConfigArgs::default()
        };
        let result = Config::resolve(args, FileConfig::builtin(), no_env);
        assert!(matches!(result, Err(ConfigError::MissingJudgeKey)));
    }

    #[test]
    fn test_judge_key_falls_back_to_openai_key() {
        let config = Config::resolve(ConfigArgs::default(), FileConfig::builtin(), |name| {
            (name == "OPENAI_API_KEY").then(|| "openai-key".to_string())
        })
        .unwrap();
        assert_eq!(config.judge.api_key, "openai-key");
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(args_with_judge_key(), FileConfig::builtin(), no_env).unwrap();

        assert_eq!(config.judge.base_url, DEFAULT_JUDGE_BASE_URL);
        assert_eq!(config.judge.model, "gpt-4o");
        assert_eq!(config.judge.temperature, 0.7);
        assert_eq!(config.judge.max_tokens, None);
        assert_eq!(config.test_model.base_url, DEFAULT_TEST_MODEL_BASE_URL);
        assert_eq!(config.test_model.model, DEFAULT_TEST_MODEL_NAME);
        assert_eq!(config.test_model.temperature, 0.7);
        assert_eq!(config.test_model.max_tokens, Some(250));
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.label, DEFAULT_LABEL);
        assert_eq!(config.delay, Duration::from_secs(1));
        assert_eq!(config.limit, None);
        assert_eq!(
            config.dataset,
            DatasetSource::Hub {
                server_url: DEFAULT_DATASET_SERVER_URL.to_string(),
                name: "CraneAILabs/UCCB".to_string(),
                config: "default".to_string(),
                split: "test".to_string(),
                token: None,
            }
        );
    }

    #[test]
    fn test_test_model_key_falls_back_to_judge_key() {
        let config = Config::resolve(args_with_judge_key(), FileConfig::builtin(), no_env).unwrap();
        assert_eq!(config.test_model.api_key, "judge-key");
        // Only the credential is shared, the endpoint stays the test model's
        assert_eq!(config.test_model.base_url, DEFAULT_TEST_MODEL_BASE_URL);
    }

    #[test]
    fn test_separate_test_model_key() {
        let mut args = args_with_judge_key();
        args.test_model_api_key = Some("test-key".to_string());

        let config = Config::resolve(args, FileConfig::builtin(), no_env).unwrap();
        assert_eq!(config.judge.api_key, "judge-key");
        assert_eq!(config.test_model.api_key, "test-key");
    }

    #[test]
    fn test_results_path_uses_label() {
        let mut args = args_with_judge_key();
        args.label = Some("my_model_v2".to_string());
        args.output_dir = Some(PathBuf::from("/tmp/results"));

        let config = Config::resolve(args, FileConfig::builtin(), no_env).unwrap();
        assert_eq!(
            config.results_path(),
            PathBuf::from("/tmp/results/evaluation_results_my_model_v2.json")
        );
    }

    #[test]
    fn test_dataset_file_replaces_hub() {
        let mut args = args_with_judge_key();
        args.dataset_file = Some(PathBuf::from("uccb.jsonl"));

        let config = Config::resolve(args, FileConfig::builtin(), no_env).unwrap();
        assert_eq!(config.dataset, DatasetSource::File(PathBuf::from("uccb.jsonl")));
    }

    #[test]
    fn test_config_file_parsing() {
        let toml_content = r#"
judge_model = "gpt-4o-mini"
judge_temperature = 0.2
test_model_base_url = "http://localhost:8000/v1"
test_model_name = "llama-3.1-8b"
temperature = 0.3
max_tokens = 512
label = "llama_local"
dataset_split = "validation"
delay_ms = 0
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let file = FileConfig::from_file(temp_file.path()).unwrap();
        let config = Config::resolve(args_with_judge_key(), file, no_env).unwrap();

        assert_eq!(config.judge.model, "gpt-4o-mini");
        assert_eq!(config.judge.temperature, 0.2);
        assert_eq!(config.test_model.base_url, "http://localhost:8000/v1");
        assert_eq!(config.test_model.model, "llama-3.1-8b");
        assert_eq!(config.test_model.temperature, 0.3);
        assert_eq!(config.test_model.max_tokens, Some(512));
        assert_eq!(config.label, "llama_local");
        assert_eq!(config.delay, Duration::ZERO);
        match config.dataset {
            DatasetSource::Hub { split, name, .. } => {
                assert_eq!(split, "validation");
                assert_eq!(name, DEFAULT_DATASET_NAME);
            }
            other => panic!("unexpected dataset source: {:?}", other),
        }
    }

    #[test]
    fn test_config_file_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "label = \"only_label\"\n").unwrap();

        let file = FileConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(file.temperature, 0.7);
        assert_eq!(file.judge_temperature, 0.7);
        assert_eq!(file.max_tokens, 250);
        assert_eq!(file.delay_ms, 1000);
    }

    #[test]
    fn test_arguments_override_config_file() {
        let file = FileConfig {
            label: Some("from_file".to_string()),
            judge_model: Some("file-judge".to_string()),
            ..FileConfig::builtin()
        };
        let mut args = args_with_judge_key();
        args.label = Some("from_args".to_string());
        args.delay_ms = Some(10);

        let config = Config::resolve(args, file, no_env).unwrap();
        assert_eq!(config.label, "from_args");
        assert_eq!(config.judge.model, "file-judge");
        assert_eq!(config.delay, Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_config_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "label = [not toml").unwrap();

        let result = FileConfig::from_file(temp_file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_config_file() {
        let result = FileConfig::from_file(Path::new("/nonexistent/eval.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
