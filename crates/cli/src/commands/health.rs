//! Supervisor self-health command

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, ReadinessResponse};
use crate::output::{color_status, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct HealthReport {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

fn component_rows(health: &HealthResponse) -> Vec<ComponentRow> {
    let mut rows: Vec<ComponentRow> = health
        .components
        .iter()
        .map(|(name, component)| ComponentRow {
            name: name.clone(),
            status: color_status(&component.status),
            message: component.message.clone().unwrap_or_default(),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

/// Show liveness and readiness of the supervisor process
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.probe("healthz").await?;
    let readiness: ReadinessResponse = client.probe("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&HealthReport { health, readiness })?,
        OutputFormat::Table => {
            println!("{}", "Supervisor Health".bold());
            println!("{}", "=".repeat(50));
            println!("Status:                 {}", color_status(&health.status).bold());

            let ready = if readiness.ready {
                "yes".green().to_string()
            } else {
                "no".red().to_string()
            };
            match &readiness.reason {
                Some(reason) => println!("Ready:                  {} ({})", ready, reason),
                None => println!("Ready:                  {}", ready),
            }
            println!();

            print_table(component_rows(&health), "No components registered");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ComponentHealth;
    use std::collections::HashMap;

    #[test]
    fn test_component_rows_sorted_by_name() {
        let mut components = HashMap::new();
        for (name, status) in [("remediation", "healthy"), ("collector", "degraded")] {
            components.insert(
                name.to_string(),
                ComponentHealth {
                    status: status.to_string(),
                    message: None,
                    last_check_timestamp: 0,
                },
            );
        }
        let health = HealthResponse {
            status: "degraded".to_string(),
            components,
        };

        let rows = component_rows(&health);

        assert_eq!(rows[0].name, "collector");
        assert_eq!(rows[1].name, "remediation");
        assert_eq!(rows[1].message, "");
    }
}
