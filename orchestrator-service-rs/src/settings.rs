//! Pipeline settings read from a [`ConfigProvider`].

use std::str::FromStr;
use std::time::Duration;

use tool_sdk::{ConfigProvider, ConfigProviderExt, ServiceConfig, ServiceError};

/// Output formats the reporter can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportFormat {
    Markdown,
    Json,
    Text,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Json => "json",
            ReportFormat::Text => "txt",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "markdown",
            ReportFormat::Json => "json",
            ReportFormat::Text => "text",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "json" => Ok(ReportFormat::Json),
            "text" | "txt" => Ok(ReportFormat::Text),
            other => Err(ServiceError::configuration(format!("unknown report format: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Upper bound on sources the collector extracts
    pub max_sources: usize,
    /// Sources scoring below this relevance are dropped
    pub min_relevance: f64,
    pub stage_timeout: Duration,
    /// How long a finished request id stays reserved
    pub retention: Duration,
    pub report_formats: Vec<ReportFormat>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_sources: 5,
            min_relevance: 0.05,
            stage_timeout: Duration::from_secs(60),
            retention: Duration::from_secs(3600),
            report_formats: vec![ReportFormat::Markdown, ReportFormat::Json, ReportFormat::Text],
        }
    }
}

impl PipelineSettings {
    /// Read settings, keeping the default for every key that is absent.
    ///
    /// Present but malformed values are errors rather than silently ignored.
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> tool_sdk::Result<Self> {
        let defaults = Self::default();

        let max_sources = match provider.get_string("max_sources") {
            Ok(_) => {
                let value = provider.get_int("max_sources")?;
                usize::try_from(value).map_err(|_| {
                    ServiceError::configuration(format!("max_sources must be positive, got {}", value))
                })?
            }
            Err(_) => defaults.max_sources,
        };

        let min_relevance = match provider.get_string("min_relevance") {
            Ok(_) => provider.get_float("min_relevance")?,
            Err(_) => defaults.min_relevance,
        };

        let stage_timeout = match provider.get_string("stage_timeout") {
            Ok(_) => provider.get_duration("stage_timeout")?,
            Err(_) => defaults.stage_timeout,
        };

        let retention = match provider.get_string("retention") {
            Ok(_) => provider.get_duration("retention")?,
            Err(_) => defaults.retention,
        };

        let report_formats = match provider.get_list("report_formats") {
            Ok(list) => list
                .iter()
                .map(|s| s.parse::<ReportFormat>())
                .collect::<tool_sdk::Result<Vec<_>>>()?,
            Err(_) => defaults.report_formats,
        };

        let settings = Self {
            max_sources,
            min_relevance,
            stage_timeout,
            retention,
            report_formats,
        };
        settings.validate()?;
        Ok(settings)
    }
}

impl ServiceConfig for PipelineSettings {
    fn validate(&self) -> tool_sdk::Result<()> {
        if self.max_sources == 0 {
            return Err(ServiceError::validation("max_sources must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_relevance) {
            return Err(ServiceError::validation(format!(
                "min_relevance must be within [0, 1], got {}",
                self.min_relevance
            )));
        }
        if self.stage_timeout.is_zero() {
            return Err(ServiceError::validation("stage_timeout must be non-zero"));
        }
        Ok(())
    }

    fn service_name(&self) -> &str {
        "orchestrator-service"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tool_sdk::MemoryConfigProvider;

    #[test]
    fn test_defaults_when_unset() {
        let settings = PipelineSettings::from_provider(&MemoryConfigProvider::new()).unwrap();
        assert_eq!(settings.max_sources, 5);
        assert_eq!(settings.stage_timeout, Duration::from_secs(60));
        assert_eq!(settings.report_formats.len(), 3);
    }

    #[test]
    fn test_overrides_and_validation() {
        let provider = MemoryConfigProvider::new()
            .with("max_sources", "2")
            .with("stage_timeout", "500ms")
            .with("report_formats", "md, json");
        let settings = PipelineSettings::from_provider(&provider).unwrap();
        assert_eq!(settings.max_sources, 2);
        assert_eq!(settings.stage_timeout, Duration::from_millis(500));
        assert_eq!(settings.report_formats, vec![ReportFormat::Markdown, ReportFormat::Json]);

        let bad = MemoryConfigProvider::new().with("min_relevance", "1.5");
        assert!(PipelineSettings::from_provider(&bad).is_err());

        let unknown = MemoryConfigProvider::new().with("report_formats", "pdf");
        assert!(PipelineSettings::from_provider(&unknown).is_err());
    }
}
