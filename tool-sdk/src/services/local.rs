//! Deterministic local stand-ins for every known capability.
//!
//! Output shapes match what the remote endpoints return, so a stage cannot
//! tell whether it was served by the primary or by this invoker. The same
//! arguments always produce the same output.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::{capability, CapabilityCall, ToolInvoker};
use crate::error::{Result, ServiceError};
use crate::util::{extract_keywords, keyword_frequencies, slugify, tokenize};

const CATEGORY_FAMILIES: &[(&str, &[&str])] = &[
    ("AI/ML", &["artificial", "intelligence", "machine", "learning", "model", "models", "neural"]),
    ("Policy", &["policy", "regulation", "government", "law", "governance", "compliance"]),
    ("Technology", &["tech", "technology", "software", "digital", "data", "computing"]),
    ("Business", &["business", "company", "market", "industry", "economic", "investment"]),
];

#[derive(Debug, Clone, Default)]
pub struct LocalToolInvoker;

impl LocalToolInvoker {
    pub fn new() -> Self {
        Self
    }

    fn search(call: &CapabilityCall) -> Value {
        let query = call.arg_str("query").unwrap_or_default();
        let max_results = call
            .arguments
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(3)
            .min(3) as usize;
        let slug = slugify(query, 4);

        let titles = [
            format!("Overview of {}", query),
            format!("Recent developments in {}", query),
            format!("{}: analysis and outlook", query),
        ];

        let results: Vec<Value> = titles
            .iter()
            .take(max_results)
            .enumerate()
            .map(|(i, title)| {
                json!({
                    "source_id": format!("local://search/{}/{}", slug, i + 1),
                    "title": title,
                    "url": format!("https://example.org/{}/{}", slug, i + 1),
                    "snippet": format!("Summary of coverage on {}.", query),
                })
            })
            .collect();

        json!({ "query": query, "results": results })
    }

    fn extract(call: &CapabilityCall) -> Result<Value> {
        let source_id = call
            .arg_str("source_id")
            .ok_or_else(|| ServiceError::validation("content_extraction requires source_id"))?;
        let title = call.arg_str("title").unwrap_or(source_id);
        let topic = extract_keywords(title, 5).join(" ");

        let content = format!(
            "{title}. This offline summary collects reporting on {topic}. \
             Analysts tracking {topic} highlight steady progress, open questions \
             and notable stakeholders across the sector."
        );

        Ok(json!({
            "source_id": source_id,
            "title": title,
            "content": content,
        }))
    }

    fn analyze(call: &CapabilityCall) -> Value {
        let documents: Vec<&str> = call
            .arguments
            .get("documents")
            .and_then(Value::as_array)
            .map(|docs| {
                docs.iter()
                    .filter_map(|d| d.get("text").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        let keywords: Vec<Value> = keyword_frequencies(documents.iter().copied(), 20)
            .into_iter()
            .map(|(keyword, frequency)| json!({ "keyword": keyword, "frequency": frequency }))
            .collect();

        let mut categories: BTreeMap<String, usize> = BTreeMap::new();
        for doc in &documents {
            *categories.entry(classify(doc).to_string()).or_default() += 1;
        }

        let mut insights = Vec::new();
        if let Some((top, count)) = categories
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        {
            insights.push(format!(
                "{} of {} sources fall under {}",
                count,
                documents.len(),
                top
            ));
        }
        let top_terms: Vec<&str> = keywords
            .iter()
            .take(3)
            .filter_map(|k| k.get("keyword").and_then(Value::as_str))
            .collect();
        if !top_terms.is_empty() {
            insights.push(format!("Recurring themes: {}", top_terms.join(", ")));
        }
        if documents.len() < 2 {
            insights.push("Coverage is thin; gather more sources before acting".to_string());
        }

        json!({
            "keywords": keywords,
            "categories": categories,
            "insights": insights,
        })
    }

    fn visualize(call: &CapabilityCall) -> Value {
        let title = call.arg_str("title").unwrap_or("chart");
        let chart_type = call.arg_str("chart_type").unwrap_or("bar");
        json!({
            "chart_ref": format!("local://charts/{}-{}.png", slugify(title, 4), chart_type),
            "chart_type": chart_type,
        })
    }

    fn store(call: &CapabilityCall) -> Result<Value> {
        let key = call
            .arg_str("key")
            .ok_or_else(|| ServiceError::validation("storage requires key"))?;
        let operation = call.arg_str("operation").unwrap_or("put");
        Ok(json!({
            "stored_ref": format!("local://storage/{}", key),
            "operation": operation,
            "status": "stored",
        }))
    }

    fn deliver(call: &CapabilityCall) -> Value {
        let subject = call.arg_str("subject").unwrap_or("report");
        json!({
            "channel": call.capability,
            "status": "queued_locally",
            "message_id": format!("local-{}-{}", call.capability, slugify(subject, 4)),
        })
    }
}

fn classify(text: &str) -> &'static str {
    let words = tokenize(text);
    CATEGORY_FAMILIES
        .iter()
        .find(|(_, family)| words.iter().any(|w| family.contains(&w.as_str())))
        .map(|(name, _)| *name)
        .unwrap_or("General")
}

#[async_trait]
impl ToolInvoker for LocalToolInvoker {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn invoke(&self, call: &CapabilityCall) -> Result<Value> {
        match call.capability.as_str() {
            capability::WEB_SEARCH => Ok(Self::search(call)),
            capability::CONTENT_EXTRACTION => Self::extract(call),
            capability::ANALYSIS => Ok(Self::analyze(call)),
            capability::VISUALIZATION => Ok(Self::visualize(call)),
            capability::STORAGE => Self::store(call),
            capability::WEBHOOK_DELIVERY
            | capability::EMAIL_DELIVERY
            | capability::SLACK_DELIVERY
            | capability::NOTION_DELIVERY => Ok(Self::deliver(call)),
            other => Err(ServiceError::not_found(format!("no local stand-in for '{}'", other))),
        }
    }
}
