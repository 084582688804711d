//! Reporter: assemble the final report from the whole envelope chain,
//! render it in each configured format and deliver it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use shared_types_rs::{
    ActionOutcome, CollectedSource, DeliveryResult, DeliveryStatus, Findings, Request,
    StageEnvelope, StageName, StagePayload,
};
use tool_sdk::util::truncate_string;
use tool_sdk::{capability, KeyedCall, ToolAccess};
use tracing::info;

use super::{expect_payload, str_field, StageInput};
use crate::errors::StageError;
use crate::settings::ReportFormat;

const DELIVERY_CHANNELS: [&str; 3] = [
    capability::EMAIL_DELIVERY,
    capability::SLACK_DELIVERY,
    capability::NOTION_DELIVERY,
];

const TITLE_CHARS: usize = 80;

#[derive(Debug, Clone)]
pub struct ReporterWorker {
    formats: Vec<ReportFormat>,
}

/// Everything the report says, gathered from the envelope chain.
#[derive(Debug, Serialize)]
struct ReportDocument<'a> {
    title: String,
    request_id: &'a str,
    request: &'a str,
    generated_at: DateTime<Utc>,
    query: &'a str,
    sources: &'a [CollectedSource],
    findings: &'a Findings,
    insight_text: &'a str,
    insights: &'a [String],
    chart_refs: &'a [String],
    actions: &'a [ActionOutcome],
    persisted_refs: &'a [String],
    used_fallback: BTreeSet<String>,
}

impl<'a> ReportDocument<'a> {
    fn assemble(request: &'a Request, envelope: &'a StageEnvelope) -> Result<Self, StageError> {
        let (query, sources) = match expect_payload(envelope, StageName::Collector)? {
            StagePayload::Collected { query, sources, .. } => (query.as_str(), sources.as_slice()),
            _ => return Err(StageError::InvalidInput("collector payload mismatch".to_string())),
        };
        let (findings, insight_text, insights, chart_refs) =
            match expect_payload(envelope, StageName::Processor)? {
                StagePayload::Processed {
                    findings,
                    insight_text,
                    insights,
                    chart_refs,
                } => (findings, insight_text.as_str(), insights.as_slice(), chart_refs.as_slice()),
                _ => return Err(StageError::InvalidInput("processor payload mismatch".to_string())),
            };
        let (actions, persisted_refs) = match expect_payload(envelope, StageName::Action)? {
            StagePayload::Actions {
                executed_actions,
                persisted_refs,
            } => (executed_actions.as_slice(), persisted_refs.as_slice()),
            _ => return Err(StageError::InvalidInput("action payload mismatch".to_string())),
        };

        Ok(Self {
            title: format!("Research report: {}", truncate_string(request.raw_text().trim(), TITLE_CHARS)),
            request_id: request.id(),
            request: request.raw_text(),
            generated_at: Utc::now(),
            query,
            sources,
            findings,
            insight_text,
            insights,
            chart_refs,
            actions,
            persisted_refs,
            used_fallback: envelope.fallback_trail(),
        })
    }

    fn render(&self, format: ReportFormat) -> Result<String, StageError> {
        match format {
            ReportFormat::Markdown => self.render_markdown(),
            ReportFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| StageError::ArtifactGeneration(format!("json: {}", e))),
            ReportFormat::Text => self.render_text(),
        }
    }

    fn render_markdown(&self) -> Result<String, StageError> {
        let mut out = String::new();
        self.write_markdown(&mut out)
            .map_err(|e| StageError::ArtifactGeneration(format!("markdown: {}", e)))?;
        Ok(out)
    }

    fn write_markdown(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "# {}", self.title)?;
        writeln!(out)?;
        writeln!(out, "- Request: {}", self.request)?;
        writeln!(out, "- Request id: `{}`", self.request_id)?;
        writeln!(out, "- Generated: {}", self.generated_at.to_rfc3339())?;
        writeln!(out, "- Search query: `{}`", self.query)?;

        writeln!(out, "\n## Sources\n")?;
        for source in self.sources {
            writeln!(
                out,
                "- {} (`{}`), relevance {:.2}",
                source.title, source.source_id, source.relevance_score
            )?;
        }

        writeln!(out, "\n## Findings\n")?;
        writeln!(out, "- Top category: {}", self.findings.top_category().unwrap_or("n/a"))?;
        writeln!(out, "- Quality score: {:.2}", self.findings.quality_score)?;
        writeln!(out, "- Relevance score: {:.2}", self.findings.relevance_score)?;
        writeln!(out, "- Keywords: {}", self.keyword_line())?;

        writeln!(out, "\n## Insights\n")?;
        for insight in self.insights {
            writeln!(out, "- {}", insight)?;
        }
        if self.insights.is_empty() {
            writeln!(out, "{}", self.insight_text)?;
        }
        for chart in self.chart_refs {
            writeln!(out, "\n![chart]({})", chart)?;
        }

        writeln!(out, "\n## Actions\n")?;
        for action in self.actions {
            writeln!(out, "- **{}**: {:?} ({})", action.action_name, action.status, action.detail)?;
        }

        if !self.used_fallback.is_empty() {
            writeln!(out, "\n## Local stand-ins\n")?;
            writeln!(out, "Served without the primary endpoint: {}", self.fallback_line())?;
        }
        Ok(())
    }

    fn render_text(&self) -> Result<String, StageError> {
        let mut out = String::new();
        self.write_text(&mut out)
            .map_err(|e| StageError::ArtifactGeneration(format!("text: {}", e)))?;
        Ok(out)
    }

    fn write_text(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "{}", self.title)?;
        writeln!(out, "{}", "=".repeat(self.title.chars().count()))?;
        writeln!(out, "Request: {} ({})", self.request, self.request_id)?;
        writeln!(out, "Sources: {}", self.sources.len())?;
        writeln!(out, "Keywords: {}", self.keyword_line())?;
        writeln!(out, "Insight: {}", self.insight_text)?;
        let succeeded = self
            .actions
            .iter()
            .filter(|a| a.status == shared_types_rs::ActionStatus::Succeeded)
            .count();
        writeln!(out, "Actions: {}/{} succeeded", succeeded, self.actions.len())?;
        if !self.used_fallback.is_empty() {
            writeln!(out, "Local stand-ins: {}", self.fallback_line())?;
        }
        Ok(())
    }

    fn keyword_line(&self) -> String {
        let line = self
            .findings
            .keywords
            .iter()
            .take(10)
            .map(|k| format!("{} ({})", k.keyword, k.frequency))
            .collect::<Vec<_>>()
            .join(", ");
        if line.is_empty() {
            "none".to_string()
        } else {
            line
        }
    }

    fn fallback_line(&self) -> String {
        self.used_fallback.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

impl ReporterWorker {
    pub fn new(formats: Vec<ReportFormat>) -> Self {
        Self { formats }
    }

    pub async fn execute(
        &self,
        input: &StageInput<'_>,
        tools: &ToolAccess,
    ) -> Result<StagePayload, StageError> {
        if self.formats.is_empty() {
            return Err(StageError::ArtifactGeneration("no report formats configured".to_string()));
        }

        let request = input.request;
        let document = ReportDocument::assemble(request, input.previous()?)?;

        let mut artifacts = BTreeMap::new();
        let mut report_refs = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            let content = document.render(*format)?;
            if content.trim().is_empty() {
                return Err(StageError::ArtifactGeneration(format!("empty {} artifact", format.as_str())));
            }
            artifacts.insert(format.as_str().to_string(), content);
            report_refs.push(format!("artifact://{}/report.{}", request.id(), format.extension()));
        }

        let report_text = artifacts
            .get(ReportFormat::Markdown.as_str())
            .or_else(|| artifacts.values().next())
            .cloned()
            .unwrap_or_default();

        let delivery_results = deliver(&document.title, &report_text, &report_refs, tools).await;

        info!(
            request_id = %request.id(),
            formats = artifacts.len(),
            deliveries = delivery_results.len(),
            "report generated"
        );

        Ok(StagePayload::Report {
            title: document.title,
            report_text,
            report_refs,
            artifacts,
            delivery_results,
        })
    }
}

/// Send the report to every registered channel. Failures are reported per
/// channel and never fail the stage.
async fn deliver(
    title: &str,
    body: &str,
    report_refs: &[String],
    tools: &ToolAccess,
) -> Vec<DeliveryResult> {
    let channels: Vec<&str> = DELIVERY_CHANNELS
        .iter()
        .copied()
        .filter(|c| tools.has_capability(c))
        .collect();
    let calls = channels
        .iter()
        .map(|channel| {
            KeyedCall::new(
                *channel,
                json!({ "subject": title, "body": body, "report_refs": report_refs }),
            )
        })
        .collect();
    let mut results = tools.invoke_concurrent(calls).await;

    channels
        .into_iter()
        .map(|channel| {
            let (status, detail) = match results.remove(channel) {
                Some(Ok(result)) => {
                    let status = if result.is_fallback() {
                        DeliveryStatus::DeliveredViaFallback
                    } else {
                        DeliveryStatus::Delivered
                    };
                    let detail = str_field(&result.data, "message_id")
                        .or_else(|| str_field(&result.data, "status"))
                        .unwrap_or("accepted")
                        .to_string();
                    (status, detail)
                }
                Some(Err(err)) => (DeliveryStatus::Failed, err.to_string()),
                None => (DeliveryStatus::Failed, "no result returned".to_string()),
            };
            DeliveryResult {
                channel: channel.to_string(),
                status,
                detail,
            }
        })
        .collect()
}
