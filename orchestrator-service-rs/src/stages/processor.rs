//! Processor: turn collected sources into structured findings.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{json, Value};
use shared_types_rs::{CollectedSource, Findings, KeywordCount, StagePayload};
use tool_sdk::util::keyword_set;
use tool_sdk::{capability, ToolAccess};
use tracing::{info, warn};

use super::{str_field, StageInput};
use crate::errors::StageError;

/// Finding keywords compared against the request when scoring relevance
const RELEVANCE_WINDOW: usize = 20;

#[derive(Debug, Default, Deserialize)]
struct AnalysisResult {
    #[serde(default)]
    keywords: Vec<KeywordCount>,
    #[serde(default)]
    categories: BTreeMap<String, usize>,
    #[serde(default)]
    insights: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessorWorker;

impl ProcessorWorker {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(
        &self,
        input: &StageInput<'_>,
        tools: &ToolAccess,
    ) -> Result<StagePayload, StageError> {
        let (query, sources) = match &input.previous()?.payload {
            StagePayload::Collected { query, sources, .. } => (query, sources),
            _ => {
                return Err(StageError::InvalidInput(
                    "processor expects a collected envelope".to_string(),
                ))
            }
        };
        if sources.is_empty() {
            return Err(StageError::InvalidInput("no sources to analyze".to_string()));
        }

        let documents: Vec<Value> = sources
            .iter()
            .map(|s| json!({ "source_id": s.source_id, "title": s.title, "text": s.extracted_text }))
            .collect();
        let analysis = tools
            .invoke(capability::ANALYSIS, json!({ "query": query, "documents": documents }))
            .await?;
        let parsed: AnalysisResult = serde_json::from_value(analysis.data)
            .map_err(|e| StageError::malformed(capability::ANALYSIS, e.to_string()))?;

        let findings = Findings {
            quality_score: quality_score(sources),
            relevance_score: relevance_score(input.request.raw_text(), &parsed.keywords),
            keywords: parsed.keywords,
            categories: parsed.categories,
        };

        let insight_text = if parsed.insights.is_empty() {
            format!("Analyzed {} sources without notable insights.", sources.len())
        } else {
            parsed.insights.join(" ")
        };

        let mut chart_refs = Vec::new();
        if tools.has_capability(capability::VISUALIZATION) && !findings.categories.is_empty() {
            let args = json!({ "title": query, "chart_type": "bar", "series": findings.categories });
            match tools.invoke(capability::VISUALIZATION, args).await {
                Ok(chart) => chart_refs.extend(str_field(&chart.data, "chart_ref").map(str::to_string)),
                Err(err) => warn!(
                    request_id = %input.request.id(),
                    error = %err,
                    "visualization unavailable, continuing without charts"
                ),
            }
        }

        info!(
            request_id = %input.request.id(),
            keywords = findings.keywords.len(),
            top_category = findings.top_category().unwrap_or("none"),
            quality_score = findings.quality_score,
            relevance_score = findings.relevance_score,
            "findings derived"
        );

        Ok(StagePayload::Processed {
            findings,
            insight_text,
            insights: parsed.insights,
            chart_refs,
        })
    }
}

/// Mean source relevance.
fn quality_score(sources: &[CollectedSource]) -> f64 {
    if sources.is_empty() {
        return 0.0;
    }
    sources.iter().map(|s| s.relevance_score).sum::<f64>() / sources.len() as f64
}

/// Share of the request's content words found among the top findings.
fn relevance_score(raw_text: &str, keywords: &[KeywordCount]) -> f64 {
    let request_terms = keyword_set(raw_text);
    if request_terms.is_empty() {
        return 0.0;
    }
    let matched = keywords
        .iter()
        .take(RELEVANCE_WINDOW)
        .filter(|k| request_terms.contains(&k.keyword.to_lowercase()))
        .count();
    (matched as f64 / request_terms.len() as f64).min(1.0)
}
