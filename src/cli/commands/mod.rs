//! CLI command implementations

pub mod config;
pub mod crop;
pub mod decode;
pub mod deliver;
pub mod flush;
pub mod path;
pub mod styles;

pub use config::execute as config;
pub use crop::execute as crop;
pub use decode::execute as decode;
pub use deliver::{execute as deliver, get};
pub use flush::execute as flush;
pub use path::{execute as path, url};
pub use styles::execute as styles;
