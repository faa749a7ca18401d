use std::sync::Arc;

use anyhow::Result;
use lumen_gfx::GpuContext;
use lumen_gfx::wgpu; // import wgpu from lumen-gfx to keep type identity

use crate::atlas::AtlasOffset;
use crate::surface::{PlacementOutcome, SurfaceId, SurfaceRegistry};

/// Listener invoked synchronously after the rendering device was replaced.
/// Runs with the new device already bound and the atlas rebuilt, so it can
/// re-upload and re-copy immediately.
pub type ReplacedCallback = Box<dyn FnMut(&mut GraphicsDevice) -> Result<()> + Send>;

const DEFAULT_ATLAS_DIMENSION: u32 = 1024;

/// Owner of the current rendering-device binding and of every drawing
/// surface. Surfaces keep their identity when the device underneath is
/// replaced; their pixel content does not.
pub struct GraphicsDevice {
    context: GpuContext,
    atlas_format: wgpu::TextureFormat,
    atlas_texture: Arc<wgpu::Texture>,
    atlas_view: Arc<wgpu::TextureView>,
    registry: SurfaceRegistry,
    replaced_callbacks: Vec<ReplacedCallback>,
}

impl GraphicsDevice {
    pub fn new(context: GpuContext, atlas_format: wgpu::TextureFormat) -> Self {
        let limit = context.device().limits().max_texture_dimension_2d;
        let dim = DEFAULT_ATLAS_DIMENSION.min(limit);
        let registry = SurfaceRegistry::new(dim, dim, limit);
        let (atlas_texture, atlas_view) = create_atlas(&context, atlas_format, dim, dim);
        Self {
            context,
            atlas_format,
            atlas_texture,
            atlas_view,
            registry,
            replaced_callbacks: Vec::new(),
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn generation(&self) -> u64 {
        self.context.generation()
    }

    pub fn atlas_format(&self) -> wgpu::TextureFormat {
        self.atlas_format
    }

    pub fn atlas_view(&self) -> &wgpu::TextureView {
        &self.atlas_view
    }

    pub fn atlas_size(&self) -> (u32, u32) {
        self.registry.atlas_size()
    }

    /// Create a drawing surface. The initial size can be a placeholder (the
    /// demo defers its image load and starts at 1x1); a later resize keeps
    /// the same identity.
    pub fn create_drawing_surface(&mut self, width: u32, height: u32) -> Result<SurfaceId> {
        let (id, outcome) = self.registry.create(width, height)?;
        self.apply_placement(outcome);
        Ok(id)
    }

    pub fn surface_size(&self, id: SurfaceId) -> Option<(u32, u32)> {
        self.registry.size_of(id)
    }

    /// The surface's current offset within the atlas. May change on every
    /// draw session or device replacement.
    pub fn surface_offset(&self, id: SurfaceId) -> Option<AtlasOffset> {
        self.registry.offset_of(id)
    }

    pub fn resize_surface(&mut self, id: SurfaceId, width: u32, height: u32) -> Result<()> {
        let outcome = self.registry.resize(id, width, height)?;
        self.apply_placement(outcome);
        Ok(())
    }

    /// Copy an uploaded texture into a drawing surface.
    ///
    /// Resizes the surface to the source's exact dimensions, opens a draw
    /// session to learn the atlas offset, copies the whole source there
    /// (single subresource, no scaling, no conversion) and closes the
    /// session. The session close happens even when the copy fails.
    pub fn copy_into_surface(&mut self, id: SurfaceId, source: &wgpu::Texture) -> Result<()> {
        anyhow::ensure!(
            source.format() == self.atlas_format,
            "source texture format {:?} does not match surface format {:?}",
            source.format(),
            self.atlas_format,
        );
        let (width, height) = (source.width(), source.height());
        self.resize_surface(id, width, height)?;

        let context = self.context.clone();
        let atlas_texture = self.atlas_texture.clone();
        let session = self.registry.begin_draw(id)?;
        let offset = session.offset();
        let copy_result = copy_at_offset(&context, &atlas_texture, offset, source, width, height);
        if copy_result.is_ok() {
            log::debug!(
                "copied {}x{} into {:?} at atlas offset ({}, {})",
                width,
                height,
                session.surface_id(),
                offset.x,
                offset.y
            );
        }
        drop(session);
        copy_result
    }

    pub fn on_rendering_device_replaced(&mut self, callback: ReplacedCallback) {
        self.replaced_callbacks.push(callback);
    }

    /// Substitute a fresh context for the current one.
    ///
    /// Every resource from the old device is invalid from here on: the atlas
    /// texture is rebuilt on the new device and all surfaces are re-placed
    /// (sizes survive, content does not). The replaced callbacks then run
    /// synchronously, in registration order, to redo their uploads.
    pub fn set_rendering_device(&mut self, context: GpuContext) -> Result<()> {
        log::info!(
            "rendering device replaced: generation {} -> {}",
            self.context.generation(),
            context.generation()
        );
        self.context = context;
        let outcome = self.registry.invalidate_all()?;
        let (width, height) = match outcome {
            PlacementOutcome::AtlasGrown { width, height } => (width, height),
            PlacementOutcome::InPlace => self.registry.atlas_size(),
        };
        let (texture, view) = create_atlas(&self.context, self.atlas_format, width, height);
        self.atlas_texture = texture;
        self.atlas_view = view;

        let mut callbacks = std::mem::take(&mut self.replaced_callbacks);
        let mut result = Ok(());
        for callback in callbacks.iter_mut() {
            if let Err(err) = callback(self) {
                result = Err(err);
                break;
            }
        }
        // A callback may have registered further listeners while the list was
        // detached; keep them.
        callbacks.append(&mut self.replaced_callbacks);
        self.replaced_callbacks = callbacks;
        result
    }

    fn apply_placement(&mut self, outcome: PlacementOutcome) {
        if let PlacementOutcome::AtlasGrown { width, height } = outcome {
            log::info!("growing atlas texture to {width}x{height}");
            let (texture, view) = create_atlas(&self.context, self.atlas_format, width, height);
            self.atlas_texture = texture;
            self.atlas_view = view;
        }
    }
}

fn create_atlas(
    context: &GpuContext,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
) -> (Arc<wgpu::Texture>, Arc<wgpu::TextureView>) {
    let texture = context.device().create_texture(&wgpu::TextureDescriptor {
        label: Some("compositor-atlas"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (Arc::new(texture), Arc::new(view))
}

fn copy_at_offset(
    context: &GpuContext,
    atlas: &wgpu::Texture,
    offset: AtlasOffset,
    source: &wgpu::Texture,
    width: u32,
    height: u32,
) -> Result<()> {
    let device = context.device();
    // Copy errors are reported out-of-band; an error scope turns them into a
    // Result the caller can propagate.
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("surface-copy-encoder"),
    });
    encoder.copy_texture_to_texture(
        wgpu::ImageCopyTexture {
            texture: source,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyTexture {
            texture: atlas,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: offset.x,
                y: offset.y,
                z: 0,
            },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    context.queue().submit(std::iter::once(encoder.finish()));
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        anyhow::bail!("surface copy failed: {err}");
    }
    Ok(())
}
