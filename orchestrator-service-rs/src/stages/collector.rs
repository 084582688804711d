//! Collector: discover sources for the request and extract their content.
//!
//! Sources whose extraction fails are skipped and counted; the stage only
//! fails when no extraction succeeds at all.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use shared_types_rs::{CollectedSource, StagePayload};
use tool_sdk::util::{extract_keywords, jaccard, keyword_set, word_set};
use tool_sdk::{capability, KeyedCall, ServiceError, ToolAccess};
use tracing::{debug, info, warn};

use super::{str_field, StageInput};
use crate::errors::StageError;

/// Number of request keywords used to build the search query
const QUERY_TERMS: usize = 5;

#[derive(Debug, Clone)]
pub struct CollectorWorker {
    max_sources: usize,
    min_relevance: f64,
}

#[derive(Debug, Clone)]
struct Candidate {
    source_id: String,
    title: String,
    url: Option<String>,
}

impl CollectorWorker {
    pub fn new(max_sources: usize, min_relevance: f64) -> Self {
        Self {
            max_sources: max_sources.max(1),
            min_relevance,
        }
    }

    pub async fn execute(
        &self,
        input: &StageInput<'_>,
        tools: &ToolAccess,
    ) -> Result<StagePayload, StageError> {
        let raw_text = input.request.raw_text();
        let query = derive_query(raw_text);

        let search = tools
            .invoke(
                capability::WEB_SEARCH,
                json!({ "query": query, "max_results": self.max_sources }),
            )
            .await?;
        let mut candidates = parse_candidates(&search.data)?;
        if candidates.is_empty() {
            return Err(StageError::NoSources(format!("search for '{}' returned no results", query)));
        }

        let discovered = candidates.len();
        candidates.truncate(self.max_sources);

        let calls = candidates
            .iter()
            .map(|c| {
                KeyedCall::new(
                    capability::CONTENT_EXTRACTION,
                    json!({ "source_id": c.source_id, "title": c.title, "url": c.url }),
                )
                .keyed(c.source_id.clone())
            })
            .collect();
        let mut extracted = tools.invoke_concurrent(calls).await;

        let basis = RelevanceBasis::for_request(raw_text);
        let attempted = candidates.len();
        let mut sources = Vec::with_capacity(attempted);
        let mut dropped = 0;
        let mut failed = 0;
        let mut first_failure: Option<ServiceError> = None;

        for candidate in candidates {
            let result = match extracted.remove(&candidate.source_id) {
                Some(Ok(result)) => result,
                Some(Err(err)) => {
                    warn!(source_id = %candidate.source_id, error = %err, "extraction failed, skipping source");
                    failed += 1;
                    first_failure.get_or_insert(err);
                    continue;
                }
                None => {
                    return Err(StageError::malformed(
                        capability::CONTENT_EXTRACTION,
                        format!("missing result for {}", candidate.source_id),
                    ))
                }
            };
            let Some(text) = str_field(&result.data, "content") else {
                warn!(source_id = %candidate.source_id, "extraction returned no content, skipping source");
                failed += 1;
                continue;
            };

            let relevance_score = basis.score(&format!("{} {}", candidate.title, text));
            if relevance_score < self.min_relevance {
                debug!(source_id = %candidate.source_id, relevance_score, "dropping low-relevance source");
                dropped += 1;
                continue;
            }

            sources.push(CollectedSource {
                source_id: candidate.source_id,
                title: candidate.title,
                extracted_text: text.to_string(),
                relevance_score,
            });
        }

        if failed == attempted {
            return Err(match first_failure {
                Some(err) => StageError::from(err),
                None => StageError::malformed(
                    capability::CONTENT_EXTRACTION,
                    "no source returned any content",
                ),
            });
        }
        if sources.is_empty() {
            return Err(StageError::NoSources(format!(
                "all {} extracted sources scored below {}",
                dropped, self.min_relevance
            )));
        }

        sources.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });

        info!(
            request_id = %input.request.id(),
            %query,
            discovered,
            kept = sources.len(),
            dropped,
            failed,
            "sources collected"
        );

        Ok(StagePayload::Collected {
            query,
            sources,
            discovered,
            dropped,
            failed,
        })
    }
}

/// How extracted sources are scored against the request.
#[derive(Debug, Clone, PartialEq)]
enum RelevanceBasis {
    /// Jaccard similarity over content keywords
    Keywords(BTreeSet<String>),
    /// The request has no content words ("AI", "What is 5G?"): share of
    /// its raw words that appear in the source
    Words(BTreeSet<String>),
}

impl RelevanceBasis {
    fn for_request(raw_text: &str) -> Self {
        let keywords = keyword_set(raw_text);
        if keywords.is_empty() {
            RelevanceBasis::Words(word_set(raw_text))
        } else {
            RelevanceBasis::Keywords(keywords)
        }
    }

    fn score(&self, source_text: &str) -> f64 {
        match self {
            RelevanceBasis::Keywords(terms) => jaccard(terms, &keyword_set(source_text)),
            RelevanceBasis::Words(words) if words.is_empty() => 0.0,
            RelevanceBasis::Words(words) => {
                let source_words = word_set(source_text);
                words.intersection(&source_words).count() as f64 / words.len() as f64
            }
        }
    }
}

/// Search query built from the first content words of the request.
pub fn derive_query(raw_text: &str) -> String {
    let terms = extract_keywords(raw_text, QUERY_TERMS);
    if terms.is_empty() {
        raw_text.trim().to_string()
    } else {
        terms.join(" ")
    }
}

fn parse_candidates(data: &Value) -> Result<Vec<Candidate>, StageError> {
    let results = data
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| StageError::malformed(capability::WEB_SEARCH, "missing 'results' array"))?;

    let mut seen = BTreeSet::new();
    let candidates = results
        .iter()
        .filter_map(|item| {
            let source_id = str_field(item, "source_id").or_else(|| str_field(item, "url"))?;
            if !seen.insert(source_id.to_string()) {
                return None;
            }
            Some(Candidate {
                source_id: source_id.to_string(),
                title: str_field(item, "title").unwrap_or(source_id).to_string(),
                url: str_field(item, "url").map(str::to_string),
            })
        })
        .collect();
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_uses_content_words() {
        assert_eq!(derive_query("What is the latest AI policy news?"), "policy news");
        assert_eq!(derive_query("  AI  "), "AI");
    }

    #[test]
    fn test_short_requests_score_on_raw_words() {
        let basis = RelevanceBasis::for_request("What is 5G?");
        assert!(matches!(basis, RelevanceBasis::Words(_)));
        assert!((basis.score("Overview of 5G rollout") - 1.0 / 3.0).abs() < 1e-9);
        assert!((basis.score("What is 5G and why it matters") - 1.0).abs() < 1e-9);
        assert_eq!(basis.score("Gardening tips"), 0.0);

        let basis = RelevanceBasis::for_request("AI policy news");
        assert!(matches!(basis, RelevanceBasis::Keywords(_)));
        assert_eq!(basis.score("policy news"), 1.0);
    }

    #[test]
    fn test_candidates_are_deduplicated() {
        let data = json!({ "results": [
            { "source_id": "a", "title": "First" },
            { "source_id": "a", "title": "Again" },
            { "url": "https://b.example", "title": "" },
            { "title": "no id" },
        ]});
        let candidates = parse_candidates(&data).unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "First");
        assert_eq!(candidates[1].source_id, "https://b.example");
        assert_eq!(candidates[1].title, "https://b.example");

        assert!(parse_candidates(&json!({ "query": "q" })).is_err());
    }
}
