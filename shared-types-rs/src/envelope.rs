use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// The four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Collector,
    Processor,
    Action,
    Reporter,
}

impl StageName {
    pub const ALL: [StageName; 4] = [
        StageName::Collector,
        StageName::Processor,
        StageName::Action,
        StageName::Reporter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Collector => "collector",
            StageName::Processor => "processor",
            StageName::Action => "action",
            StageName::Reporter => "reporter",
        }
    }

    /// Zero-based position in the pipeline.
    pub fn index(&self) -> usize {
        match self {
            StageName::Collector => 0,
            StageName::Processor => 1,
            StageName::Action => 2,
            StageName::Reporter => 3,
        }
    }

    pub fn next(&self) -> Option<StageName> {
        StageName::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source discovered and extracted by the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedSource {
    pub source_id: String,
    pub title: String,
    pub extracted_text: String,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub frequency: usize,
}

/// Structured findings derived by the processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Findings {
    pub keywords: Vec<KeywordCount>,
    pub categories: BTreeMap<String, usize>,
    pub quality_score: f64,
    pub relevance_score: f64,
}

impl Findings {
    /// Category with the highest count, ties broken alphabetically.
    pub fn top_category(&self) -> Option<&str> {
        self.categories
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_name: String,
    pub status: ActionStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    DeliveredViaFallback,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub channel: String,
    pub status: DeliveryStatus,
    pub detail: String,
}

/// Stage-specific content of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    Collected {
        query: String,
        sources: Vec<CollectedSource>,
        discovered: usize,
        /// Extracted but below the relevance threshold
        dropped: usize,
        /// Extraction failed
        #[serde(default)]
        failed: usize,
    },
    Processed {
        findings: Findings,
        insight_text: String,
        insights: Vec<String>,
        chart_refs: Vec<String>,
    },
    Actions {
        executed_actions: Vec<ActionOutcome>,
        persisted_refs: Vec<String>,
    },
    Report {
        title: String,
        report_text: String,
        report_refs: Vec<String>,
        artifacts: BTreeMap<String, String>,
        delivery_results: Vec<DeliveryResult>,
    },
}

/// Immutable output of one stage.
///
/// Envelopes are never mutated after construction. Each one keeps a shared
/// link to the envelope it was derived from, so the chain is the provenance
/// trail of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEnvelope {
    pub stage_name: StageName,
    pub payload: StagePayload,
    pub produced_at: DateTime<Utc>,
    pub used_fallback: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Arc<StageEnvelope>>,
}

impl StageEnvelope {
    pub fn new(
        stage_name: StageName,
        payload: StagePayload,
        used_fallback: BTreeSet<String>,
        parent: Option<Arc<StageEnvelope>>,
    ) -> Self {
        Self {
            stage_name,
            payload,
            produced_at: Utc::now(),
            used_fallback,
            parent,
        }
    }

    /// Iterate over this envelope and all of its ancestors, newest first.
    pub fn lineage(&self) -> impl Iterator<Item = &StageEnvelope> {
        std::iter::successors(Some(self), |env| env.parent.as_deref())
    }

    /// Find the envelope produced by `stage` in this envelope's lineage.
    pub fn find(&self, stage: StageName) -> Option<&StageEnvelope> {
        self.lineage().find(|env| env.stage_name == stage)
    }

    /// Every capability that fell back anywhere in the lineage.
    pub fn fallback_trail(&self) -> BTreeSet<String> {
        self.lineage()
            .flat_map(|env| env.used_fallback.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collected() -> StageEnvelope {
        StageEnvelope::new(
            StageName::Collector,
            StagePayload::Collected {
                query: "ai policy".into(),
                sources: vec![],
                discovered: 0,
                dropped: 0,
                failed: 0,
            },
            BTreeSet::from(["web_search".to_string()]),
            None,
        )
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(StageName::Collector.next(), Some(StageName::Processor));
        assert_eq!(StageName::Reporter.next(), None);
        assert!(StageName::Collector < StageName::Reporter);
        assert_eq!(StageName::Action.to_string(), "action");
    }

    #[test]
    fn test_lineage_walks_parents() {
        let parent = Arc::new(collected());
        let child = StageEnvelope::new(
            StageName::Processor,
            StagePayload::Processed {
                findings: Findings::default(),
                insight_text: String::new(),
                insights: vec![],
                chart_refs: vec![],
            },
            BTreeSet::from(["analysis".to_string()]),
            Some(parent.clone()),
        );

        let stages: Vec<_> = child.lineage().map(|e| e.stage_name).collect();
        assert_eq!(stages, vec![StageName::Processor, StageName::Collector]);
        assert!(child.find(StageName::Collector).is_some());
        assert_eq!(child.fallback_trail().len(), 2);
        // the parent is shared, not copied
        assert_eq!(parent.used_fallback.len(), 1);
    }

    #[test]
    fn test_top_category_breaks_ties_alphabetically() {
        let mut findings = Findings::default();
        findings.categories.insert("Technology".into(), 2);
        findings.categories.insert("AI/ML".into(), 2);
        findings.categories.insert("General".into(), 1);
        assert_eq!(findings.top_category(), Some("AI/ML"));
    }

    #[test]
    fn test_payload_serializes_with_kind_tag() {
        let json = serde_json::to_value(collected()).unwrap();
        assert_eq!(json["payload"]["kind"], "collected");
        assert_eq!(json["stage_name"], "collector");
        assert!(json.get("parent").is_none());
    }
}
