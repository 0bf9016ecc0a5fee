//! Path and URL commands - where a derivative lives and how it is linked

use crate::cli::args::PathArgs;
use crate::cli::Site;
use crate::config::Config;
use crate::crop::CropId;
use crate::error::CropResult;

/// Print the storage path of a derivative
pub async fn execute(args: PathArgs, config: &Config) -> CropResult<()> {
    let site = Site::open(config, false).await?;
    let path = site
        .resolver
        .compute_derivative_path(&args.source, &args.style, args.crop.and_then(CropId::new))?;
    println!("{}", path);
    Ok(())
}

/// Print the public URL of a derivative
pub async fn url(args: PathArgs, config: &Config) -> CropResult<()> {
    let site = Site::open(config, false).await?;
    let crop_id = args.crop.and_then(CropId::new);
    let path = site
        .resolver
        .compute_derivative_path(&args.source, &args.style, crop_id)?;
    let url = site
        .resolver
        .build_public_url(&path, &args.source, &args.style, crop_id)
        .await?;
    println!("{}", url);
    Ok(())
}
