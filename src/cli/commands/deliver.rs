//! Deliver and get commands - generate a derivative once and fetch it

use crate::cli::args::{DeliverArgs, GetArgs, OutputArgs};
use crate::cli::Site;
use crate::config::Config;
use crate::crop::CropId;
use crate::derivative::{CropTarget, DeliverRequest, DerivativeResponse};
use crate::error::{CropError, CropResult};
use crate::inbound::{InboundRoute, PathProcessor};
use crate::ui::{self, UiContext};
use tokio::fs;
use tracing::info;
use url::form_urlencoded;

/// Execute the deliver command
pub async fn execute(args: DeliverArgs, config: &Config) -> CropResult<()> {
    let site = Site::open(config, args.output.grant).await?;

    let target = match (args.context, args.crop) {
        (Some(context), _) => {
            site.register_source(&args.source).await?;
            CropTarget::Context(context)
        }
        (None, crop) => CropTarget::from(crop.and_then(CropId::new)),
    };

    let token = match args.token {
        Some(token) => token,
        None => site.resolver.path_token(&args.style, &args.source)?,
    };

    let request = DeliverRequest {
        source_uri: args.source,
        style_id: args.style,
        target,
        token: Some(token),
    };
    let response = site
        .resolver
        .deliver(&request)
        .await
        .map_err(public_error)?;
    write_response(&response, &args.output).await
}

/// Execute the get command
pub async fn get(args: GetArgs, config: &Config) -> CropResult<()> {
    let site = Site::open(config, args.output.grant).await?;

    let (path, query) = match args.path.split_once('?') {
        Some((path, query)) => (path, query),
        None => (args.path.as_str(), ""),
    };
    let token = form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "itok")
        .map(|(_, value)| value.into_owned());

    let processor = PathProcessor::new(&config.files.public_dir);
    let route = match processor
        .process_inbound(path, site.resolver.crop_store())
        .await
        .map_err(public_error)?
    {
        InboundRoute::Contextual(route) => route,
        InboundRoute::Passthrough(path) => {
            return Err(CropError::NotFound(format!(
                "{} is not a contextual derivative path",
                path
            )));
        }
    };

    let response = site
        .resolver
        .deliver(&route.into_request(token))
        .await
        .map_err(public_error)?;
    write_response(&response, &args.output).await
}

/// Log the full error and hand back only what a requester may see
fn public_error(e: CropError) -> CropError {
    info!("Delivery failed: {}", e);
    e.into_public()
}

async fn write_response(response: &DerivativeResponse, output: &OutputArgs) -> CropResult<()> {
    let ctx = UiContext::detect();

    if let Some(ref path) = output.output {
        fs::write(path, &response.bytes)
            .await
            .map_err(|e| CropError::io(format!("writing {}", path.display()), e))?;
        ui::step_ok_detail(&ctx, "Derivative written", &path.display().to_string());
    }

    ui::key_value(&ctx, "uri", &response.uri.to_string());
    ui::key_value(&ctx, "content-type", &response.content_type);
    ui::key_value(&ctx, "content-length", &response.content_length.to_string());
    ui::key_value(
        &ctx,
        "cache",
        if response.public { "public" } else { "private" },
    );
    for (name, value) in &response.headers {
        ui::key_value(&ctx, name, value);
    }
    Ok(())
}
