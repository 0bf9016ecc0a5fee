//! Styles command - list configured image styles

use crate::cli::args::{OutputFormat, StylesArgs};
use crate::config::Config;
use crate::crop::CropTypeDefinition;
use crate::error::CropResult;
use crate::style::StyleRegistry;
use crate::ui::{self, UiContext};
use console::style;
use serde::Serialize;

#[derive(Serialize)]
struct StyleRow {
    id: String,
    label: String,
    effects: Vec<String>,
    crop_types: Vec<String>,
}

/// Execute the styles command
pub async fn execute(args: StylesArgs, config: &Config) -> CropResult<()> {
    let registry = StyleRegistry::from_config(config);
    let definitions = CropTypeDefinition::from_config(config);

    let rows: Vec<StyleRow> = registry
        .iter()
        .map(|s| StyleRow {
            id: s.id.clone(),
            label: s.label.clone(),
            effects: s.effects.iter().map(|e| e.id.clone()).collect(),
            crop_types: s.crop_types(&definitions),
        })
        .collect();

    if rows.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => ui::step_info(&UiContext::detect(), "No image styles configured"),
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&rows),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Plain => {
            for row in &rows {
                println!("{}", row.id);
            }
        }
    }
    Ok(())
}

fn print_table(rows: &[StyleRow]) {
    println!(
        "{:<20} {:<24} {:<16} {}",
        style("STYLE").bold(),
        style("LABEL").bold(),
        style("CROP TYPES").bold(),
        style("EFFECTS").bold()
    );
    println!("{}", "-".repeat(80));

    for row in rows {
        let crop_types = if row.crop_types.is_empty() {
            "-".to_string()
        } else {
            row.crop_types.join(",")
        };
        println!(
            "{:<20} {:<24} {:<16} {}",
            row.id,
            row.label,
            crop_types,
            row.effects.join(" > ")
        );
    }

    println!();
    println!("{} style(s)", rows.len());
}
