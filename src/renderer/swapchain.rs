use anyhow::{anyhow, Result};
use gfx_hal::{adapter::Adapter, format as f, prelude::*, pso, window, Backend};
use log::debug;

pub struct Swapchain<'a, B: Backend> {
    device: &'a B::Device,
    adapter: &'a Adapter<B>,
    pub viewport: pso::Viewport,
    pub dims: window::Extent2D,
    pub surface: &'a mut B::Surface,
    pub format: f::Format,
}

impl<'a, B: Backend> Swapchain<'a, B> {
    pub fn new(
        device: &'a B::Device,
        surface: &'a mut B::Surface,
        adapter: &'a Adapter<B>,
        dims: window::Extent2D,
    ) -> Result<Self> {
        let formats = surface.supported_formats(&adapter.physical_device);
        let format = formats
            .and_then(|formats| pick_format(&formats))
            .unwrap_or(f::Format::Rgba8Srgb);

        let viewport = pso::Viewport {
            rect: pso::Rect {
                x: 0,
                y: 0,
                w: dims.width as _,
                h: dims.height as _,
            },
            depth: 0.0..1.0,
        };

        let mut swapchain = Swapchain {
            device,
            surface,
            adapter,
            viewport,
            format,
            dims,
        };

        swapchain.recreate()?;
        Ok(swapchain)
    }

    /// (Re)configures the surface's swapchain and fits the viewport to it.
    pub fn recreate(&mut self) -> Result<()> {
        let caps = self.surface.capabilities(&self.adapter.physical_device);

        let mut swap_config = window::SwapchainConfig::from_caps(&caps, self.format, self.dims);
        swap_config.present_mode = window::PresentMode::FIFO;
        let extent = swap_config.extent;
        debug!(
            "configuring swapchain: {:?} {}x{}",
            self.format, extent.width, extent.height
        );
        unsafe {
            self.surface
                .configure_swapchain(&self.device, swap_config)
                .map_err(|err| anyhow!("can't create swapchain: {:?}", err))?;
        }

        self.viewport.rect.w = extent.width as _;
        self.viewport.rect.h = extent.height as _;
        Ok(())
    }
}

/// Prefers an sRGB format, falling back to whatever the surface lists first.
fn pick_format(formats: &[f::Format]) -> Option<f::Format> {
    formats
        .iter()
        .find(|format| format.base_format().1 == f::ChannelType::Srgb)
        .or_else(|| formats.first())
        .copied()
}

impl<'a, B: Backend> Drop for Swapchain<'a, B> {
    fn drop(&mut self) {
        debug!("unconfiguring swapchain");
        unsafe { self.surface.unconfigure_swapchain(&self.device) }
    }
}
