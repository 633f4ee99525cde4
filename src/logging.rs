use env_logger::{Builder, Env};

/// Installs the global `env_logger` backend.
///
/// `filter` uses the `env_logger` syntax ("debug", "gfx_triangle=trace,gfx_backend_vulkan=warn").
/// Without it `RUST_LOG` is read, falling back to `info`. Calling this again is a no-op.
pub fn init(filter: Option<&str>) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(filter) = filter {
        builder.parse_filters(filter);
    }

    if builder.try_init().is_ok() {
        log::debug!("logging initialized");
    }
}
