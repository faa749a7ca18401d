use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use lumen_gfx::wgpu;

use crate::atlas::AtlasOffset;

/// Where a surface's atlas slot lands on screen, as the quad the brush draws.
///
/// `dst` is the clip-space rectangle (left, top, right, bottom), `uv` the
/// matching texture rectangle within the atlas. Content is drawn at its
/// natural pixel size, centered; anything past the viewport edge is clipped
/// by the rasterizer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushPlacement {
    pub dst: [f32; 4],
    pub uv: [f32; 4],
}

impl BrushPlacement {
    pub fn centered(
        viewport: (u32, u32),
        content: (u32, u32),
        offset: AtlasOffset,
        atlas: (u32, u32),
    ) -> Self {
        let (vw, vh) = (viewport.0.max(1) as f32, viewport.1.max(1) as f32);
        let (cw, ch) = (content.0 as f32, content.1 as f32);
        let (aw, ah) = (atlas.0.max(1) as f32, atlas.1.max(1) as f32);
        // Half-extents in clip space; a content dimension equal to the
        // viewport's spans the full -1..1 range.
        let hw = cw / vw;
        let hh = ch / vh;
        let u0 = offset.x as f32 / aw;
        let v0 = offset.y as f32 / ah;
        let u1 = (offset.x as f32 + cw) / aw;
        let v1 = (offset.y as f32 + ch) / ah;
        Self {
            dst: [-hw, hh, hw, -hh],
            uv: [u0, v0, u1, v1],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct BrushUniform {
    dst: [f32; 4],
    uv: [f32; 4],
}

/// Draws one atlas slot as a textured quad over the swapchain.
pub struct SurfaceBrush {
    pipeline: wgpu::RenderPipeline,
    bgl: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform: wgpu::Buffer,
}

impl SurfaceBrush {
    pub fn new(device: Arc<wgpu::Device>, target_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("brush-shader"),
            source: wgpu::ShaderSource::Wgsl(lumen_shaders::BRUSH_WGSL.into()),
        });

        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("brush-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(32),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("brush-pipeline-layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("brush-pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        // 1:1 presentation, so nearest sampling keeps pixels exact.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("brush-sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("brush-uniform"),
            size: std::mem::size_of::<BrushUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipeline,
            bgl,
            sampler,
            uniform,
        }
    }

    pub fn set_placement(&self, queue: &wgpu::Queue, placement: BrushPlacement) {
        let uniform = BrushUniform {
            dst: placement.dst,
            uv: placement.uv,
        };
        queue.write_buffer(&self.uniform, 0, bytemuck::bytes_of(&uniform));
    }

    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        atlas_view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("brush-bg"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(atlas_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    pub fn record<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>, bg: &'a wgpu::BindGroup) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bg, &[]);
        pass.draw(0..4, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_quad_for_half_size_content() {
        let p = BrushPlacement::centered(
            (800, 600),
            (400, 300),
            AtlasOffset { x: 0, y: 0 },
            (1024, 1024),
        );
        assert_eq!(p.dst, [-0.5, 0.5, 0.5, -0.5]);
        assert_eq!(p.uv, [0.0, 0.0, 400.0 / 1024.0, 300.0 / 1024.0]);
    }

    #[test]
    fn test_uv_tracks_atlas_offset() {
        let p = BrushPlacement::centered(
            (800, 600),
            (256, 128),
            AtlasOffset { x: 512, y: 256 },
            (1024, 1024),
        );
        assert_eq!(p.uv, [0.5, 0.25, 0.75, 0.375]);
    }

    #[test]
    fn test_full_viewport_content_spans_clip_space() {
        let p = BrushPlacement::centered(
            (640, 480),
            (640, 480),
            AtlasOffset { x: 0, y: 0 },
            (1024, 1024),
        );
        assert_eq!(p.dst, [-1.0, 1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_oversized_content_overhangs_evenly() {
        // Larger than the viewport: the quad extends past clip space by the
        // same amount on both sides and the rasterizer clips it.
        let p = BrushPlacement::centered(
            (400, 400),
            (800, 400),
            AtlasOffset { x: 0, y: 0 },
            (1024, 1024),
        );
        assert_eq!(p.dst, [-2.0, 1.0, 2.0, -1.0]);
    }
}
