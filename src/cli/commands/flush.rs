//! Flush command - delete contextual derivatives of a style

use crate::cli::args::FlushArgs;
use crate::cli::Site;
use crate::config::Config;
use crate::error::CropResult;
use crate::ui::{self, UiContext};

/// Execute the flush command
pub async fn execute(args: FlushArgs, config: &Config) -> CropResult<()> {
    let ctx = UiContext::detect();
    let site = Site::open(config, false).await?;

    site.resolver
        .flush_style(&args.style, args.source.as_deref())
        .await?;

    match args.source {
        Some(source) => ui::step_ok_detail(
            &ctx,
            &format!("Flushed {} derivatives", args.style),
            &source,
        ),
        None => ui::step_ok(&ctx, &format!("Flushed {} derivatives", args.style)),
    }
    Ok(())
}
