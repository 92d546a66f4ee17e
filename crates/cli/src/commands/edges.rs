//! Edge target command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, EdgeTarget, EdgeTargetList};
use crate::output::{color_reliability, color_status, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct EdgeTargetRow {
    #[tabled(rename = "Target")]
    name: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Reliability")]
    reliability: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Weight")]
    weight: u32,
    #[tabled(rename = "Endpoint")]
    endpoint: String,
}

fn target_rows(targets: &[EdgeTarget], inactive_only: bool) -> Vec<EdgeTargetRow> {
    targets
        .iter()
        .filter(|t| !inactive_only || !t.active)
        .map(|t| EdgeTargetRow {
            name: t.name.clone(),
            provider: t.provider_kind.clone(),
            state: color_status(if t.active { "active" } else { "inactive" }),
            reliability: color_reliability(t.reliability_pct),
            latency: format!("{:.0}ms", t.latency_ms),
            weight: t.capacity_weight,
            endpoint: t.endpoint.clone(),
        })
        .collect()
}

/// List edge targets with their live scores
pub async fn list_targets(
    client: &ApiClient,
    inactive_only: bool,
    format: OutputFormat,
) -> Result<()> {
    let result: EdgeTargetList = client.get("api/v1/edge/targets").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let active = result.targets.iter().filter(|t| t.active).count();

            println!("{}", "Edge Targets".bold());
            print_table(
                target_rows(&result.targets, inactive_only),
                "No edge targets configured",
            );
            println!("\nActive: {} of {}", active, result.total);
        }
    }

    Ok(())
}
