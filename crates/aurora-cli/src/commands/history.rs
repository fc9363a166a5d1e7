//! `aurora history` command implementation.
//!
//! Only the file backend outlives a process, so this is useful with
//! `history.backend: file` in the configuration.

use anyhow::{Context, Result};
use aurora_core::config::HistoryBackend;
use aurora_core::{AuroraConfig, PipelineState};
use aurora_history::{AttemptRecord, DeploymentHistory, HistoryFilter};

pub async fn run(
    config: &AuroraConfig,
    service: Option<String>,
    state: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    if config.history.backend != HistoryBackend::File {
        tracing::warn!("History backend is not 'file'; only this process's attempts are visible");
    }
    let history = DeploymentHistory::new(&config.history).context("Failed to open history")?;

    let filter = HistoryFilter {
        service_id: service,
        state: state.map(parse_state).transpose()?,
        limit,
        ..Default::default()
    };
    let records = history.query(filter).await.context("Failed to query history")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("\nDeployment History ({}):", records.len());
    for record in &records {
        println!("   {}", summary(record));
    }
    println!();
    Ok(())
}

fn parse_state(value: &str) -> Result<PipelineState> {
    let name = value.trim().to_ascii_uppercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(name))
        .with_context(|| format!("Unknown pipeline state '{}'", value))
}

fn summary(record: &AttemptRecord) -> String {
    let status = &record.response.deployment_status;
    let mut line = format!(
        "{} {} {} risk={} devices={}",
        record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
        record.service_id.as_deref().unwrap_or("-"),
        record.state,
        record.response.risk_assessment.risk_level,
        record.response.configuration_payloads.len()
    );
    if let Some(error) = &status.error {
        line.push_str(&format!(" error={}", error.kind));
    }
    if !status.manual_intervention.is_empty() {
        line.push_str(&format!(" manual={}", status.manual_intervention.join(",")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_parse_case_insensitively() {
        assert_eq!(parse_state("rolled-back").unwrap(), PipelineState::RolledBack);
        assert_eq!(parse_state("DEPLOYED").unwrap(), PipelineState::Deployed);
        assert!(parse_state("sideways").is_err());
    }

    #[test]
    fn summary_names_the_failure() {
        let mut response = aurora_core::IntentResponse::new("qos on PE1");
        response.service_id = Some("qos-1".to_string());
        response.deployment_status.error =
            Some(aurora_core::PipelineError::Cancelled.report(PipelineState::Normalized));
        let line = summary(&AttemptRecord::new(response, Vec::new()));
        assert!(line.contains("qos-1"));
        assert!(line.contains("error="));
    }
}
