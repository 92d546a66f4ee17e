//! Cluster status command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ClusterSnapshot, NodeHealth, WorkloadHealth};
use crate::output::{
    color_status, format_pct, format_ratio, format_timestamp, print_json, print_table,
    OutputFormat,
};

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    name: String,
    #[tabled(rename = "Readiness")]
    readiness: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Disk")]
    disk: String,
}

#[derive(Tabled)]
struct WorkloadRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Workload")]
    name: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Restarts")]
    restarts: u32,
    #[tabled(rename = "Age")]
    age: String,
}

fn node_rows(nodes: &[NodeHealth]) -> Vec<NodeRow> {
    nodes
        .iter()
        .map(|n| NodeRow {
            name: n.name.clone(),
            readiness: color_status(&n.readiness),
            cpu: format_pct(n.cpu_utilization_pct),
            memory: format_pct(n.memory_utilization_pct),
            disk: format_pct(n.disk_utilization_pct),
        })
        .collect()
}

fn workload_rows(workloads: &[WorkloadHealth], failing_only: bool) -> Vec<WorkloadRow> {
    workloads
        .iter()
        .filter(|w| !failing_only || w.phase != "running")
        .map(|w| WorkloadRow {
            namespace: w.namespace.clone(),
            name: w.name.clone(),
            phase: color_status(&w.phase),
            restarts: w.restart_count,
            age: format_age(w.age_seconds),
        })
        .collect()
}

fn format_age(seconds: u64) -> String {
    match seconds {
        s if s >= 86_400 => format!("{}d", s / 86_400),
        s if s >= 3_600 => format!("{}h", s / 3_600),
        s if s >= 60 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}

/// Show the latest cluster snapshot
pub async fn show_status(
    client: &ApiClient,
    show_workloads: bool,
    failing_only: bool,
    format: OutputFormat,
) -> Result<()> {
    let snapshot: ClusterSnapshot = client.get("api/v1/cluster").await?;

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => {
            println!("{}", "Cluster Status".bold());
            println!("{}", "=".repeat(50));
            println!(
                "Overall:                {}",
                color_status(&snapshot.overall_status).bold()
            );
            println!(
                "Ready nodes:            {}",
                format_ratio(snapshot.ready_node_ratio)
            );
            println!(
                "Running workloads:      {}",
                format_ratio(snapshot.running_workload_ratio)
            );
            println!("Services:               {}", snapshot.services.len());
            println!(
                "Observed at:            {}",
                format_timestamp(&snapshot.observed_at).dimmed()
            );
            println!();

            println!("{}", "Nodes".bold());
            print_table(node_rows(&snapshot.nodes), "No nodes reported");

            if show_workloads || failing_only {
                println!();
                println!("{}", "Workloads".bold());
                print_table(
                    workload_rows(&snapshot.workloads, failing_only),
                    "No matching workloads",
                );
            }
        }
    }

    Ok(())
}
