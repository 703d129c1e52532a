//! Parsing of vision quality-check responses into a score and reason.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Reason recorded when the response carries none.
pub const DEFAULT_REASON: &str = "AI quality check completed.";

/// Outcome of one quality check. `score` is always within `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub score: f64,
    pub reason: String,
    /// Explicit PASS/FAIL from the vision model, if it gave one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

impl QualityVerdict {
    /// An explicit verdict decides; otherwise the score must reach `threshold`.
    pub fn passes(&self, threshold: f64) -> bool {
        match self.passed {
            Some(passed) => passed,
            None => self.score >= threshold,
        }
    }
}

static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)SCORE:\s*(\d+(?:\.\d+)?)").expect("valid regex"));
static VERDICT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)VERDICT:\s*(PASS|FAIL)").expect("valid regex"));
static PASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPASS(?:ED)?\b").expect("valid regex"));
static FAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFAIL(?:ED)?\b").expect("valid regex"));

/// Bring a raw score onto the 0–1 scale.
///
/// Values above 1 are read as the legacy 0–100 scale.
pub fn normalize_score(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    let score = if raw > 1.0 { raw / 100.0 } else { raw };
    Some(score.clamp(0.0, 1.0))
}

/// Parse a vision response.
///
/// Tries a JSON object first (code fences and surrounding prose are
/// ignored), then the legacy `SCORE:`/`VERDICT:` text format, and finally
/// falls back to `default_score` with a generic reason.
pub fn parse_quality_response(raw: &str, default_score: f64) -> QualityVerdict {
    if let Some(verdict) = parse_json(raw, default_score) {
        return verdict;
    }
    if let Some(verdict) = parse_legacy(raw) {
        return verdict;
    }

    warn!(response = raw, "unparsable quality response, using default score");
    QualityVerdict {
        score: default_score,
        reason: DEFAULT_REASON.to_string(),
        passed: None,
    }
}

/// `"PASS"` / `"FAIL"` in any case.
fn verdict_word(word: &str) -> Option<bool> {
    match word.trim().to_ascii_uppercase().as_str() {
        "PASS" | "PASSED" => Some(true),
        "FAIL" | "FAILED" => Some(false),
        _ => None,
    }
}

fn parse_json(raw: &str, default_score: f64) -> Option<QualityVerdict> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    let value: Value = serde_json::from_str(&raw[start..=end]).ok()?;
    let object = value.as_object()?;

    let score = match object.get("score") {
        Some(Value::Number(n)) => n.as_f64().and_then(normalize_score),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().and_then(normalize_score),
        _ => None,
    }
    .unwrap_or(default_score);

    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or(DEFAULT_REASON)
        .to_string();

    let passed = match object.get("pass").or_else(|| object.get("passed")) {
        Some(Value::Bool(b)) => Some(*b),
        _ => object.get("verdict").and_then(Value::as_str).and_then(verdict_word),
    };

    Some(QualityVerdict {
        score,
        reason,
        passed,
    })
}

/// `SCORE: n` (always 0–100) with an optional `VERDICT: PASS|FAIL`.
///
/// A bare PASS or FAIL word counts as the verdict when there is no
/// `VERDICT:` line and the response does not contain both.
fn parse_legacy(raw: &str) -> Option<QualityVerdict> {
    let score = SCORE_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|s| s.is_finite())
        .map(|s| (s / 100.0).clamp(0.0, 1.0));

    let passed = VERDICT_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|v| verdict_word(v.as_str()))
        .or_else(|| match (PASS_RE.is_match(raw), FAIL_RE.is_match(raw)) {
            (true, false) => Some(true),
            (false, true) => Some(false),
            _ => None,
        });

    // Neither a score nor a verdict: not the legacy format
    if score.is_none() && passed.is_none() {
        return None;
    }

    let reason = match passed {
        Some(true) => "VERDICT: PASS".to_string(),
        Some(false) => "VERDICT: FAIL".to_string(),
        None => DEFAULT_REASON.to_string(),
    };
    Some(QualityVerdict {
        score: score.unwrap_or(0.0),
        reason,
        passed,
    })
}
