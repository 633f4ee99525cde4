use crate::error::{context, Error, Result};
use gfx_hal::{
    adapter::Adapter,
    prelude::*,
    queue::QueueGroup,
    Backend, Features,
};

/// The device half of the rendering context: the adapter that was picked,
/// its logical device, and one queue able to draw to the surface.
pub struct Context<B: Backend> {
    pub adapter: Adapter<B>,
    pub device: B::Device,
    pub queue_group: QueueGroup<B>,
}

/// Opens the first adapter with a queue family that can both draw and
/// present to `surface`.
pub fn open<B: Backend>(adapters: Vec<Adapter<B>>, surface: &B::Surface) -> Result<Context<B>> {
    for adapter in &adapters {
        log::debug!("found adapter {} ({:?})", adapter.info.name, adapter.info.device_type);
    }

    let (adapter, family_idx) = adapters
        .into_iter()
        .find_map(|adapter| {
            let idx = adapter.queue_families.iter().position(|family| {
                surface.supports_queue_family(family) && family.queue_type().supports_graphics()
            })?;
            Some((adapter, idx))
        })
        .ok_or_else(|| Error::Adapter("no adapter can draw to this surface".into()))?;
    log::info!(
        "using adapter {} ({:?})",
        adapter.info.name,
        adapter.info.device_type
    );

    let mut gpu = unsafe {
        let family = &adapter.queue_families[family_idx];
        adapter
            .physical_device
            .open(&[(family, &[1.0])], Features::empty())
    }
    .map_err(context(Error::Device, "open device"))?;

    let queue_group = gpu
        .queue_groups
        .pop()
        .filter(|group| !group.queues.is_empty())
        .ok_or_else(|| Error::Device("device opened without a queue".into()))?;

    Ok(Context {
        adapter,
        device: gpu.device,
        queue_group,
    })
}
