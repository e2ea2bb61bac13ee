//! Parsers for raw model responses.
//!
//! The model is not trusted to emit pure JSON; classification responses are
//! scanned for an embedded object and every parse failure degrades to an
//! `Unknown` result instead of an error.

use serde::Deserialize;

/// Fields recovered from a classification response.
#[derive(Debug, Clone)]
pub struct ParsedClassification {
    pub category: String,
    pub confidence: Option<f64>,
    pub tags: Vec<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassificationPayload {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Parse a classification response.
///
/// Strips code-fence markers, isolates the JSON object between the first `{`
/// and the last `}`, and tolerates missing fields. Never fails: unparseable
/// input yields `category = "Unknown"` with a note.
pub fn parse_classification(response: &str) -> ParsedClassification {
    let stripped = strip_code_fences(response);

    let Some(json) = isolate_json(&stripped) else {
        return unknown("no JSON object found in model response");
    };

    match serde_json::from_str::<ClassificationPayload>(json) {
        Ok(payload) => {
            let category = payload
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string());
            ParsedClassification {
                category,
                confidence: payload.confidence,
                tags: payload.tags,
                note: None,
            }
        }
        Err(e) => unknown(&format!("model response was not valid JSON: {}", e)),
    }
}

/// Parse a summary response into the summary text and up to five key points.
///
/// The trimmed response is the summary verbatim; key points are sentence
/// fragments longer than twenty characters.
pub fn parse_summary(response: &str) -> (String, Vec<String>) {
    let summary = response.trim().to_string();

    let key_points: Vec<String> = summary
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|fragment| fragment.chars().count() > 20)
        .take(5)
        .map(str::to_string)
        .collect();

    (summary, key_points)
}

fn unknown(note: &str) -> ParsedClassification {
    ParsedClassification {
        category: "Unknown".to_string(),
        confidence: None,
        tags: Vec::new(),
        note: Some(note.to_string()),
    }
}

fn strip_code_fences(response: &str) -> String {
    response.replace("```json", "").replace("```", "")
}

/// Isolate the JSON object between the first `{` and the last `}`.
fn isolate_json(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&response[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_with_prose_is_parsed() {
        let response = "Here is the result: ```json\n{\"category\":\"Invoice\",\"confidence\":0.9,\"tags\":[\"financial\",\"urgent\"]}\n```";
        let parsed = parse_classification(response);
        assert_eq!(parsed.category, "Invoice");
        assert_eq!(parsed.confidence, Some(0.9));
        assert_eq!(parsed.tags, vec!["financial", "urgent"]);
        assert!(parsed.note.is_none());
    }

    #[test]
    fn gibberish_degrades_to_unknown() {
        let parsed = parse_classification("I could not decide on anything, sorry!");
        assert_eq!(parsed.category, "Unknown");
        assert!(parsed.tags.is_empty());
        assert!(parsed.note.is_some());
    }

    #[test]
    fn broken_json_degrades_to_unknown() {
        let parsed = parse_classification("{\"category\": \"Contract\", \"tags\": [broken");
        assert_eq!(parsed.category, "Unknown");
        assert!(parsed.note.is_some());
    }

    #[test]
    fn missing_category_defaults_to_unknown() {
        let parsed = parse_classification("{\"confidence\": 0.5}");
        assert_eq!(parsed.category, "Unknown");
        assert_eq!(parsed.confidence, Some(0.5));
    }

    #[test]
    fn surrounding_prose_is_ignored() {
        let parsed =
            parse_classification("Sure! {\"category\": \"Report\"} Hope that helps.");
        assert_eq!(parsed.category, "Report");
    }

    #[test]
    fn summary_is_trimmed_response() {
        let (summary, _) = parse_summary("  A short note about nothing much.  ");
        assert_eq!(summary, "A short note about nothing much.");
    }

    #[test]
    fn key_points_keep_long_fragments_capped_at_five() {
        let text = "Short. This fragment is clearly long enough to keep. \
                    Tiny! Another fragment that easily clears the length bar? \
                    One more fragment that also clears the length bar. \
                    Fragment number four that is long enough to count. \
                    Fragment number five that is long enough to count. \
                    Fragment number six that is long enough to count.";
        let (_, points) = parse_summary(text);
        assert_eq!(points.len(), 5);
        assert!(points.iter().all(|p| p.chars().count() > 20));
        assert!(!points.iter().any(|p| p == "Short"));
    }
}
