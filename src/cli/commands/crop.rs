//! Crop command - save, list and invalidate contextual crops

use crate::cli::args::{CropAction, CropArgs, OutputFormat};
use crate::cli::Site;
use crate::config::Config;
use crate::crop::{Crop, CropId, CropSettings, CropStore, ImageItem};
use crate::error::{CropError, CropResult};
use crate::ui::{self, UiContext};
use crate::uri::StreamUri;
use console::style;
use tokio::task;

/// Execute the crop command
pub async fn execute(args: CropArgs, config: &Config) -> CropResult<()> {
    let site = Site::open(config, false).await?;

    match args.action {
        CropAction::Save {
            source,
            style,
            context,
            settings,
            plugin,
        } => save(&site, &source, &style, context, settings, plugin).await,
        CropAction::List { context, format } => list(&site, context.as_deref(), format).await,
        CropAction::Invalidate { context } => {
            let deleted = site.resolver.invalidate_context(&context).await?;
            ui::step_ok_detail(
                &UiContext::detect(),
                &format!("Deleted {} derivative(s)", deleted),
                &context,
            );
            Ok(())
        }
    }
}

async fn save(
    site: &Site,
    source: &str,
    style_id: &str,
    context: String,
    settings: String,
    plugin_id: String,
) -> CropResult<()> {
    let uri = StreamUri::parse(source)?;
    let path = site.files.resolve(&uri)?;
    if !path.exists() {
        return Err(CropError::NotFound(format!("source image {}", uri)));
    }
    site.register_source(source).await?;

    let (width, height) = task::spawn_blocking(move || image::image_dimensions(&path))
        .await
        .map_err(|e| CropError::Internal(format!("dimension task failed: {}", e)))??;

    let image = ImageItem {
        uri: uri.to_string(),
        width,
        height,
        parent: None,
    };
    let settings = CropSettings {
        plugin_id,
        crop_setting: settings,
        context,
    };

    let url = site.resolver.contextualize(&image, style_id, &settings).await?;
    println!("{}", url);
    Ok(())
}

async fn list(site: &Site, context: Option<&str>, format: OutputFormat) -> CropResult<()> {
    let crops = match context {
        Some(prefix) => site.crops.find_by_context_prefix(prefix).await?,
        None => site.crops.all(),
    };

    if crops.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => ui::step_info(&UiContext::detect(), "No crops"),
        }
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_table(&crops),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&crops)?),
        OutputFormat::Plain => {
            for crop in &crops {
                println!("{}", CropId::segment(crop.id));
            }
        }
    }
    Ok(())
}

fn print_table(crops: &[Crop]) {
    println!(
        "{:<6} {:<14} {:<12} {:<32} {}",
        style("ID").bold(),
        style("TYPE").bold(),
        style("POINT").bold(),
        style("SOURCE").bold(),
        style("CONTEXT").bold()
    );
    println!("{}", "-".repeat(96));

    for crop in crops {
        let (x, y) = crop.position();
        println!(
            "{:<6} {:<14} {:<12} {:<32} {}",
            CropId::segment(crop.id),
            crop.crop_type,
            format!("{},{}", x, y),
            crop.uri,
            crop.context
        );
    }

    println!();
    println!("{} crop(s)", crops.len());
}
