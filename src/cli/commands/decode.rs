//! Decode command - map a request path back to its derivative

use crate::cli::args::DecodeArgs;
use crate::cli::Site;
use crate::config::Config;
use crate::crop::CropId;
use crate::error::CropResult;
use crate::inbound::{InboundRoute, PathProcessor};
use crate::ui::{self, UiContext};

/// Execute the decode command
pub async fn execute(args: DecodeArgs, config: &Config) -> CropResult<()> {
    let ctx = UiContext::detect();
    let site = Site::open(config, false).await?;
    let processor = PathProcessor::new(&config.files.public_dir);

    match processor
        .process_inbound(&args.path, site.resolver.crop_store())
        .await?
    {
        InboundRoute::Passthrough(path) => {
            ui::step_info(&ctx, &format!("Not a contextual derivative: {}", path));
        }
        InboundRoute::Contextual(route) => {
            ui::key_value(&ctx, "route", &route.route_path());
            ui::key_value(&ctx, "style", &route.style_id);
            ui::key_value(&ctx, "crop", &CropId::segment(route.crop_id));
            ui::key_value(&ctx, "scheme", &route.scheme);
            ui::key_value(&ctx, "source", &route.source_uri);
        }
    }

    Ok(())
}
