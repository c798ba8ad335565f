use crate::error::JudgeError;
use crate::models::Judgement;
use serde_json::Value;

/// Build the judging prompt for one question.
///
/// The rubric weighs accuracy at 50%, cultural nuance at 30% and
/// completeness/relevance at 20%, and asks for a strict JSON reply.
pub fn build_judge_prompt(question: &str, reference_answer: &str, model_answer: &str) -> String {
    format!(
        r#"You are an expert evaluator for the Ugandan Cultural Context Benchmark (UCCB). Your task is to assess a model's generated answer based on a ground-truth reference answer.

**Evaluation Criteria:**
1.  **Accuracy (Weight: 50%):** Is the information factually correct and directly addressing the question?
2.  **Cultural Nuance (Weight: 30%):** Does the answer demonstrate an understanding of the specific Ugandan cultural context, including local terminology, social dynamics, and historical subtleties?
3.  **Completeness & Relevance (Weight: 20%):** Is the answer complete, on-topic, and free of irrelevant information?

**Scoring Rubric:**
- **Score 5 (Excellent):** The answer is fully accurate, demonstrates deep cultural nuance, and is perfectly relevant and complete. It is as good as or better than the reference answer.
- **Score 4 (Good):** The answer is factually correct and relevant but may lack some of the deeper cultural nuance or completeness of the reference answer.
- **Score 3 (Acceptable):** The answer is generally correct but contains minor inaccuracies or omissions. It understands the question but the answer is superficial.
- **Score 2 (Poor):** The answer contains significant factual inaccuracies or demonstrates a clear lack of cultural understanding. It may be only partially relevant.
- **Score 1 (Very Poor):** The answer is completely incorrect, irrelevant, or nonsensical.

**Task:**
Evaluate the "Generated Answer" for the given "Question" in comparison to the "Reference Answer". Provide your evaluation in a valid JSON format with two keys: "score" (an integer from 1 to 5) and "justification" (a brief explanation for your score).

---
**Question:**
{question}

**Reference Answer:**
{reference_answer}

**Generated Answer:**
{model_answer}
---

**Your JSON Evaluation:**
"#
    )
}

/// Parse the judge's reply into a score within 1..=5 and a justification
pub fn parse_judgement(content: &str) -> Result<Judgement, JudgeError> {
    let parsed = parse_json_response(content)?;

    let score = extract_score(&parsed)
        .ok_or_else(|| JudgeError::MissingScore(content.to_string()))?;
    if !(1..=5).contains(&score) {
        return Err(JudgeError::ScoreOutOfRange(score));
    }

    let justification = match parsed.get("justification").and_then(|j| j.as_str()) {
        Some(text) => text.to_string(),
        None => "No justification provided".to_string(),
    };

    Ok(Judgement {
        score: score as u8,
        justification,
    })
}

/// Parse JSON from the response, handling JSON wrapped in prose or fences
fn parse_json_response(content: &str) -> Result<Value, JudgeError> {
    match serde_json::from_str(content) {
        Ok(parsed) => Ok(parsed),
        Err(_) => try_extract_embedded_json(content),
    }
}

fn try_extract_embedded_json(content: &str) -> Result<Value, JudgeError> {
    let start = content
        .find('{')
        .ok_or_else(|| JudgeError::InvalidJson(content.to_string()))?;
    let end = content
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| JudgeError::InvalidJson(content.to_string()))?;

    serde_json::from_str(&content[start..=end])
        .map_err(|_| JudgeError::InvalidJson(content.to_string()))
}

/// Integers, integral floats and numeric strings are accepted
fn extract_score(parsed: &Value) -> Option<i64> {
    match parsed.get("score")? {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
