#[cfg(not(any(feature = "vulkan", feature = "metal")))]
compile_error!("enable a backend feature: `vulkan` or `metal`");

mod app;
mod config;
mod context;
mod error;
mod logging;
mod renderer;

use clap::Parser;

fn main() {
    let config = config::Config::parse();
    logging::init(config.log_level.as_deref());
    log::info!(
        "opening {}x{} window \"{}\"",
        config.width,
        config.height,
        config.title
    );

    app::run(config)
}
