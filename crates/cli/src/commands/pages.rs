//! Static page command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, PageList};
use crate::output::{format_bytes, format_timestamp, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct PageRow {
    #[tabled(rename = "Route")]
    route: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Cache")]
    cache: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Deps")]
    dependencies: usize,
    #[tabled(rename = "Hash")]
    hash: String,
    #[tabled(rename = "Built")]
    built_at: String,
}

/// List the currently published static pages
pub async fn list_pages(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: PageList = client.get("api/v1/pages").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let rows: Vec<PageRow> = result
                .pages
                .iter()
                .map(|p| PageRow {
                    route: p.route.clone(),
                    priority: p.priority.clone(),
                    cache: p.cache_strategy.clone(),
                    size: format_bytes(p.size_bytes),
                    dependencies: p.dependencies.len(),
                    hash: p.content_hash.chars().take(12).collect(),
                    built_at: format_timestamp(&p.built_at),
                })
                .collect();

            println!("{}", "Static Pages".bold());
            print_table(rows, "No pages built yet");
            println!("\nTotal: {} pages", result.total);
        }
    }

    Ok(())
}
