use crate::config::DatasetSource;
use crate::error::DatasetError;
use crate::models::DatasetItem;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// Largest page the datasets-server rows API hands out
const PAGE_SIZE: usize = 100;

/// Validated items plus the number of rows that were dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub items: Vec<DatasetItem>,
    pub skipped: usize,
}

/// Turn loosely typed rows into dataset items.
///
/// Rows without a non-blank `question` and `answer` string, or that are not
/// objects at all, are counted in `skipped` and never become items.
pub fn ingest(rows: impl IntoIterator<Item = Value>) -> IngestReport {
    let mut report = IngestReport::default();

    for (index, row) in rows.into_iter().enumerate() {
        match validate_row(index, &row) {
            Some(item) => report.items.push(item),
            None => {
                debug!(row = index, "Skipping dataset row without question or answer");
                report.skipped += 1;
            }
        }
    }

    report
}

fn validate_row(index: usize, row: &Value) -> Option<DatasetItem> {
    let object = row.as_object()?;
    let question = non_blank_string(object.get("question"))?;
    let answer = non_blank_string(object.get("answer"))?;

    let id = scalar_to_string(object.get("id")).unwrap_or_else(|| index.to_string());
    let category = scalar_to_string(object.get("category"));

    Some(DatasetItem {
        id,
        category,
        question,
        answer,
    })
}

fn non_blank_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
        _ => None,
    }
}

fn scalar_to_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        _ => None,
    }
}

/// Load raw dataset rows from the configured source, keeping at most `limit`
pub async fn load_rows(
    source: &DatasetSource,
    limit: Option<usize>,
) -> Result<Vec<Value>, DatasetError> {
    match source {
        DatasetSource::File(path) => {
            let mut rows = read_file(path)?;
            if let Some(limit) = limit {
                rows.truncate(limit);
            }
            Ok(rows)
        }
        DatasetSource::Hub {
            server_url,
            name,
            config,
            split,
            token,
        } => {
            let client = reqwest::Client::new();
            let request = RowsRequest {
                server_url,
                name,
                config,
                split,
                token: token.as_deref(),
            };
            fetch_hub_rows(&client, &request, limit).await
        }
    }
}

/// Read a JSON array file, or a JSON Lines file when the extension is `.jsonl`
pub fn read_file(path: &Path) -> Result<Vec<Value>, DatasetError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: display.clone(),
        source,
    })?;

    let is_jsonl = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl"));

    if is_jsonl {
        let mut rows = Vec::new();
        for (line_index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(line).map_err(|source| DatasetError::Json {
                path: display.clone(),
                line: line_index + 1,
                source,
            })?;
            rows.push(row);
        }
        return Ok(rows);
    }

    let parsed: Value = serde_json::from_str(&content).map_err(|source| DatasetError::Json {
        path: display.clone(),
        line: source.line(),
        source,
    })?;

    match parsed {
        Value::Array(rows) => Ok(rows),
        _ => Err(DatasetError::NotAnArray(display)),
    }
}

struct RowsRequest<'a> {
    server_url: &'a str,
    name: &'a str,
    config: &'a str,
    split: &'a str,
    token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RowsPage {
    rows: Vec<RowEntry>,
    #[serde(default)]
    num_rows_total: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RowEntry {
    row: Value,
}

/// Page through the datasets-server `/rows` endpoint
async fn fetch_hub_rows(
    client: &reqwest::Client,
    request: &RowsRequest<'_>,
    limit: Option<usize>,
) -> Result<Vec<Value>, DatasetError> {
    let url = format!("{}/rows", request.server_url.trim_end_matches('/'));
    let wanted = limit.unwrap_or(usize::MAX);
    let mut rows = Vec::new();

    while rows.len() < wanted {
        let offset = rows.len();
        let length = PAGE_SIZE.min(wanted - offset);
        debug!(offset, length, dataset = request.name, "Fetching dataset rows");

        let mut builder = client.get(&url).query(&[
            ("dataset", request.name.to_string()),
            ("config", request.config.to_string()),
            ("split", request.split.to_string()),
            ("offset", offset.to_string()),
            ("length", length.to_string()),
        ]);
        if let Some(token) = request.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatasetError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let page: RowsPage = response.json().await?;
        if page.rows.is_empty() {
            break;
        }
        rows.extend(page.rows.into_iter().map(|entry| entry.row));

        if page.num_rows_total.is_some_and(|total| rows.len() >= total) {
            break;
        }
    }

    rows.truncate(wanted);
    info!(
        rows = rows.len(),
        dataset = request.name,
        split = request.split,
        "Loaded dataset rows"
    );
    Ok(rows)
}
