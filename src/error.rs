use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("adapter error: {0}")]
    Adapter(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("shader error: {0}")]
    Shader(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("memory error: {0}")]
    Memory(String),

    #[error("swapchain error: {0}")]
    Swapchain(String),

    #[error("frame error: {0}")]
    Frame(String),

    #[error("render thread error: {0}")]
    RenderThread(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Builds a `map_err` closure that folds a gfx-hal error into `Error`,
/// prefixing it with what was being attempted.
///
/// gfx-hal errors are only guaranteed to implement `Debug`, so that is the
/// form kept in the message.
pub fn context<E: Debug>(
    variant: fn(String) -> Error,
    what: &'static str,
) -> impl FnOnce(E) -> Error {
    move |err| variant(format!("{}: {:?}", what, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct OutOfMemory;

    #[test]
    fn context_keeps_stage_and_cause() {
        let err = context(Error::Memory, "allocate vertex memory")(OutOfMemory);
        assert_eq!(
            err.to_string(),
            "memory error: allocate vertex memory: OutOfMemory"
        );
    }

    #[test]
    fn context_works_as_map_err() {
        let res: std::result::Result<(), &str> = Err("lost");
        let err = res
            .map_err(context(Error::Device, "wait idle"))
            .unwrap_err();
        assert!(matches!(err, Error::Device(ref msg) if msg == "wait idle: \"lost\""));
    }
}
