//! Action: plan and execute the side effects derived from the findings.
//!
//! Every planned action is a storage write keyed under the request id.
//! The stage succeeds when at least one action does; the optional webhook
//! notification is informational and never decides the outcome.

use serde_json::{json, Value};
use shared_types_rs::{ActionOutcome, ActionStatus, Findings, Request, StagePayload};
use tool_sdk::{capability, KeyedCall, ToolAccess};
use tracing::{info, warn};

use super::{str_field, StageInput};
use crate::errors::StageError;

const MAX_ACTIONS: usize = 5;
const QUALITY_FLOOR: f64 = 0.7;

/// One storage write decided by the planner.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAction {
    pub name: &'static str,
    pub payload: Value,
}

impl PlannedAction {
    fn new(name: &'static str, payload: Value) -> Self {
        Self { name, payload }
    }

    pub fn storage_key(&self, request_id: &str) -> String {
        format!("{}/{}", request_id, self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActionWorker;

impl ActionWorker {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(
        &self,
        input: &StageInput<'_>,
        tools: &ToolAccess,
    ) -> Result<StagePayload, StageError> {
        let (findings, insights) = match &input.previous()?.payload {
            StagePayload::Processed { findings, insights, .. } => (findings, insights),
            _ => {
                return Err(StageError::InvalidInput(
                    "action expects a processed envelope".to_string(),
                ))
            }
        };

        let plan = plan_actions(input.request, findings, insights);
        let (executed_actions, persisted_refs) = execute_plan(input.request.id(), &plan, tools).await;

        let succeeded = executed_actions
            .iter()
            .filter(|a| a.status == ActionStatus::Succeeded)
            .count();
        if succeeded == 0 {
            return Err(StageError::NoActionSucceeded {
                attempted: plan.len(),
            });
        }

        if tools.has_capability(capability::WEBHOOK_DELIVERY) {
            notify_webhook(input.request, &executed_actions, tools).await;
        }

        info!(
            request_id = %input.request.id(),
            planned = plan.len(),
            succeeded,
            "actions executed"
        );

        Ok(StagePayload::Actions {
            executed_actions,
            persisted_refs,
        })
    }
}

/// Decide which actions to run, in execution-report order.
pub fn plan_actions(request: &Request, findings: &Findings, insights: &[String]) -> Vec<PlannedAction> {
    let text = request.raw_text().to_lowercase();
    let mut plan = Vec::new();

    if findings.quality_score < QUALITY_FLOOR {
        plan.push(PlannedAction::new(
            "improve_data_quality",
            json!({ "quality_score": findings.quality_score, "target": QUALITY_FLOOR }),
        ));
    }
    if let Some(insight) = insights.first() {
        plan.push(PlannedAction::new(
            "follow_up_insight",
            json!({ "insight": insight, "category": findings.top_category() }),
        ));
    }
    if text.contains("summary") || text.contains("summarize") {
        plan.push(PlannedAction::new(
            "generate_summary",
            json!({ "keywords": findings.keywords.iter().take(10).collect::<Vec<_>>() }),
        ));
    }
    if text.contains("analysis") || text.contains("analyze") {
        plan.push(PlannedAction::new(
            "deep_analysis",
            json!({ "categories": findings.categories }),
        ));
    }
    plan.push(PlannedAction::new(
        "prepare_report",
        json!({
            "request": request.raw_text(),
            "relevance_score": findings.relevance_score,
        }),
    ));

    plan.truncate(MAX_ACTIONS);
    plan
}

/// Run every planned storage write concurrently and report in plan order.
pub async fn execute_plan(
    request_id: &str,
    plan: &[PlannedAction],
    tools: &ToolAccess,
) -> (Vec<ActionOutcome>, Vec<String>) {
    let calls = plan
        .iter()
        .map(|action| {
            KeyedCall::new(
                capability::STORAGE,
                json!({
                    "key": action.storage_key(request_id),
                    "operation": "put",
                    "value": action.payload,
                }),
            )
            .keyed(action.name)
        })
        .collect();
    let mut results = tools.invoke_concurrent(calls).await;

    let mut outcomes = Vec::with_capacity(plan.len());
    let mut persisted_refs = Vec::new();
    for action in plan {
        let outcome = match results.remove(action.name) {
            Some(Ok(result)) => {
                let stored_ref = str_field(&result.data, "stored_ref")
                    .map(str::to_string)
                    .unwrap_or_else(|| action.storage_key(request_id));
                let detail = format!("stored at {} via {}", stored_ref, result.source);
                persisted_refs.push(stored_ref);
                ActionOutcome {
                    action_name: action.name.to_string(),
                    status: ActionStatus::Succeeded,
                    detail,
                }
            }
            Some(Err(err)) => {
                warn!(request_id, action = action.name, error = %err, "action failed");
                ActionOutcome {
                    action_name: action.name.to_string(),
                    status: ActionStatus::Failed,
                    detail: err.to_string(),
                }
            }
            None => ActionOutcome {
                action_name: action.name.to_string(),
                status: ActionStatus::Failed,
                detail: "no result returned".to_string(),
            },
        };
        outcomes.push(outcome);
    }

    (outcomes, persisted_refs)
}

async fn notify_webhook(request: &Request, actions: &[ActionOutcome], tools: &ToolAccess) {
    let args = json!({
        "event": "actions_executed",
        "request_id": request.id(),
        "actions": actions,
    });
    match tools.invoke(capability::WEBHOOK_DELIVERY, args).await {
        Ok(result) => info!(request_id = %request.id(), source = %result.source, "webhook notified"),
        Err(err) => warn!(request_id = %request.id(), error = %err, "webhook notification failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn findings(quality_score: f64) -> Findings {
        Findings {
            keywords: vec![],
            categories: BTreeMap::from([("Policy".to_string(), 2)]),
            quality_score,
            relevance_score: 1.0,
        }
    }

    fn names(plan: &[PlannedAction]) -> Vec<&str> {
        plan.iter().map(|a| a.name).collect()
    }

    #[test]
    fn test_plan_for_low_quality_findings() {
        let request = Request::new("AI policy news", Some("r1".to_string())).unwrap();
        let plan = plan_actions(&request, &findings(0.2), &["insight".to_string()]);

        assert_eq!(
            names(&plan),
            vec!["improve_data_quality", "follow_up_insight", "prepare_report"]
        );
        assert_eq!(plan[0].storage_key("r1"), "r1/improve_data_quality");
    }

    #[test]
    fn test_plan_is_bounded() {
        let request = Request::new("summary and analysis of chip exports", None).unwrap();
        let plan = plan_actions(&request, &findings(0.1), &["a".to_string()]);

        assert_eq!(plan.len(), MAX_ACTIONS);
        assert_eq!(plan.last().map(|a| a.name), Some("prepare_report"));

        let good = plan_actions(&request, &findings(0.9), &[]);
        assert_eq!(names(&good), vec!["generate_summary", "deep_analysis", "prepare_report"]);
    }
}
