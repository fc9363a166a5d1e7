//! `aurora validate` command implementation.

use anyhow::{Context, Result};
use aurora_core::{ConfigPayload, PayloadFormat, Transport, Vendor};
use aurora_validation::ValidationResult;
use std::path::Path;

pub fn run(vendor: &str, format: &str, file: &Path, device: &str) -> Result<()> {
    let vendor: Vendor = vendor.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let format: PayloadFormat = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let body = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read payload from {:?}", file))?;

    let result = check(vendor, format, device, body);
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.valid {
        anyhow::bail!(
            "Payload is not valid for {} ({} finding(s))",
            vendor,
            result.findings.len()
        );
    }
    Ok(())
}

fn check(vendor: Vendor, format: PayloadFormat, device: &str, body: String) -> ValidationResult {
    let transport = match format {
        PayloadFormat::Markup => Transport::Netconf,
        PayloadFormat::StructuredData => Transport::Gnmi,
        PayloadFormat::CommandLines => Transport::Ssh,
    };
    aurora_validation::validate(vendor, &ConfigPayload::new(device, transport, format, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unresolved_placeholder_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payload.txt");
        std::fs::write(&path, "vrf {vrf}\n").unwrap();

        let err = run("cisco", "command-lines", &path, "PE2").unwrap_err();
        assert!(err.to_string().contains("not valid"));
    }

    #[test]
    fn unknown_vendor_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payload.txt");
        std::fs::write(&path, "vrf A\n").unwrap();
        assert!(run("huawei", "cli", &path, "PE2").is_err());
    }

    #[test]
    fn plain_command_lines_pass() {
        let result = check(
            Vendor::Cisco,
            PayloadFormat::CommandLines,
            "PE2",
            "vrf CUST_A\n rd 65000:100\n".to_string(),
        );
        assert!(result.valid, "{:?}", result.findings);
    }
}
