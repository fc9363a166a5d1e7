//! `aurora process` command implementation.
//!
//! Runs one intent through the full pipeline against a lab network. The lab serves as
//! both the schema store and the device channel for every transport.

use anyhow::{Context, Result};
use aurora_core::{AuroraConfig, IntentResponse, PipelineState, StaticInventory};
use aurora_runtime::{ChannelRegistry, IntentProcessor, LabNetwork};
use std::path::PathBuf;
use std::sync::Arc;

pub struct ProcessArgs {
    pub text: Option<String>,
    pub text_file: Option<PathBuf>,
    pub inventory: Option<PathBuf>,
    pub lab: PathBuf,
    pub approve: bool,
    pub approve_as: Option<String>,
}

pub async fn run(config: &AuroraConfig, args: ProcessArgs) -> Result<()> {
    let response = execute(config, args).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    report(&response)
}

/// Process the intent and, when `--approve-as` is given, approve a held attempt in the
/// same run. Approvals live in the processor, so they do not outlive this call.
async fn execute(config: &AuroraConfig, args: ProcessArgs) -> Result<IntentResponse> {
    let text = intent_text(&args)?;

    let inventory_path = args
        .inventory
        .clone()
        .or_else(|| config.inventory_file.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("No inventory given. Use --inventory or set inventory_file in the config")
        })?;
    let inventory = StaticInventory::from_file(&inventory_path)
        .with_context(|| format!("Failed to load inventory from {:?}", inventory_path))?;

    let lab = Arc::new(
        LabNetwork::from_file(&args.lab)
            .with_context(|| format!("Failed to load lab network from {:?}", args.lab))?,
    );
    let processor = IntentProcessor::new(config, lab.clone(), ChannelRegistry::uniform(lab))
        .context("Failed to build intent processor")?;

    let mut response = processor.process(&text, &inventory, args.approve).await;

    if let (PipelineState::AwaitingApproval, Some(operator)) = (response.state(), &args.approve_as)
        && let Some(approval_id) = response.deployment_status.approval_id.clone()
    {
        response = processor
            .approve(&approval_id, operator, &inventory)
            .await
            .with_context(|| format!("Approval {} was refused", approval_id))?;
    }
    Ok(response)
}

fn intent_text(args: &ProcessArgs) -> Result<String> {
    match (&args.text, &args.text_file) {
        (Some(text), _) => Ok(text.clone()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map(|t| t.trim().to_string())
            .with_context(|| format!("Failed to read intent text from {:?}", path)),
        (None, None) => anyhow::bail!("No intent given. Use --text or --text-file"),
    }
}

/// One-line outcome on stderr; an error exit for attempts that did not deploy cleanly.
fn report(response: &IntentResponse) -> Result<()> {
    let state = response.state();
    eprintln!(
        "{} [{}] risk {}",
        state,
        response.service_id.as_deref().unwrap_or("-"),
        response.risk_assessment.risk_level
    );
    match state {
        PipelineState::Failed | PipelineState::RolledBack => {
            let message = response
                .deployment_status
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_default();
            anyhow::bail!("Intent ended in {}: {}", state, message)
        }
        PipelineState::AwaitingApproval => {
            eprintln!(
                "Approval {} pending. Re-run with --approve-as <operator> to approve.",
                response.deployment_status.approval_id.as_deref().unwrap_or("-")
            );
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const INVENTORY: &str = "devices:\n  - {name: PE1, vendor: juniper, address: 192.0.2.1, bgp_asn: 65000}\n  - {name: PE2, vendor: cisco, address: 192.0.2.2, bgp_asn: 65000}\n";
    const LAB: &str = "devices:\n  - {name: PE1, vendor: juniper, os_version: '21.4R1', config: baseline}\n  - {name: PE2, vendor: cisco, os_version: '7.3.2', config: baseline}\n";
    const INTENT: &str = "Create an L3VPN service-id cli-vpn between PE1 ge-0/0/1 and PE2 GigabitEthernet0/0/0/1 with vrf CLI, AS 65000";

    fn args(dir: &std::path::Path, approve: bool) -> ProcessArgs {
        std::fs::write(dir.join("inventory.yaml"), INVENTORY).unwrap();
        std::fs::write(dir.join("lab.yaml"), LAB).unwrap();
        ProcessArgs {
            text: Some(INTENT.to_string()),
            text_file: None,
            inventory: Some(dir.join("inventory.yaml")),
            lab: dir.join("lab.yaml"),
            approve,
            approve_as: None,
        }
    }

    #[tokio::test]
    async fn deploys_against_lab() {
        let dir = tempdir().unwrap();
        run(&AuroraConfig::default(), args(dir.path(), true)).await.unwrap();
    }

    #[tokio::test]
    async fn held_deployment_is_not_an_error() {
        let dir = tempdir().unwrap();
        run(&AuroraConfig::default(), args(dir.path(), false)).await.unwrap();
    }

    #[tokio::test]
    async fn approve_as_resumes_held_deployment() {
        let dir = tempdir().unwrap();
        let held = execute(&AuroraConfig::default(), args(dir.path(), false)).await.unwrap();
        assert_eq!(held.state(), PipelineState::AwaitingApproval);

        let mut args = args(dir.path(), false);
        args.approve_as = Some("alice".to_string());
        let response = execute(&AuroraConfig::default(), args).await.unwrap();
        assert_eq!(response.state(), PipelineState::Deployed);
    }

    #[tokio::test]
    async fn missing_inventory_is_reported() {
        let dir = tempdir().unwrap();
        let mut args = args(dir.path(), true);
        args.inventory = None;
        let err = run(&AuroraConfig::default(), args).await.unwrap_err();
        assert!(err.to_string().contains("No inventory given"));
    }

    #[test]
    fn intent_text_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("intent.txt");
        std::fs::write(&path, "  QoS on PE1 with 100 Mbps\n").unwrap();
        let args = ProcessArgs {
            text: None,
            text_file: Some(path),
            inventory: None,
            lab: dir.path().join("lab.yaml"),
            approve: false,
            approve_as: None,
        };
        assert_eq!(intent_text(&args).unwrap(), "QoS on PE1 with 100 Mbps");
    }
}
