use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use lumen_compositor::{BrushPlacement, GraphicsDevice, SurfaceBrush, SurfaceId, spawn_recovery};
use lumen_gfx::wgpu;
use lumen_gfx::{
    DeviceProvider, PixelFormat, WgpuDeviceProvider, decode_file, make_surface_config, upload_image,
};
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoopBuilder;
use winit::window::WindowBuilder;

/// Loaded from the working directory, like the rest of the demo assets.
const IMAGE_FILE: &str = "tripphoto1.jpg";

#[derive(Debug)]
enum AppEvent {
    /// The recovery thread swapped in a replacement device and the image was
    /// re-uploaded; the frame needs redrawing with the new resources.
    DeviceReplaced,
    RecoveryFailed(String),
}

/// Decode the demo image, upload it to a fresh texture and copy that into the
/// drawing surface. Runs once at startup and again after every device
/// replacement.
fn load_image(graphics: &mut GraphicsDevice, id: SurfaceId) -> Result<()> {
    let image = decode_file(Path::new(IMAGE_FILE))
        .with_context(|| format!("loading {IMAGE_FILE} from the working directory"))?;
    let context = graphics.context().clone();
    let texture = upload_image(context.device(), context.queue(), &image)
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    graphics.copy_into_surface(id, &texture)
}

fn main() -> Result<()> {
    env_logger::init();

    let event_loop = EventLoopBuilder::<AppEvent>::with_user_event().build()?;
    let proxy = event_loop.create_proxy();
    let window = WindowBuilder::new()
        .with_title("CompositionImageDemo")
        .with_inner_size(LogicalSize::new(800.0, 600.0))
        .build(&event_loop)?;
    // Leak the window to satisfy wgpu surface lifetime; event loop never returns.
    let window: &'static winit::window::Window = Box::leak(Box::new(window));

    let instance = Arc::new(wgpu::Instance::default());
    let surface = Arc::new(instance.create_surface(window)?);

    let provider = WgpuDeviceProvider::new(instance.clone(), surface.clone());
    let context = provider.create_context()?;

    let mut size = window.inner_size();
    let mut config = make_surface_config(context.adapter(), &surface, size.width, size.height);
    surface.configure(context.device(), &config);

    let atlas_format = PixelFormat::Rgba8UnormSrgb.to_wgpu();
    let graphics = Arc::new(Mutex::new(GraphicsDevice::new(context.clone(), atlas_format)));

    // The surface starts as a 1x1 placeholder; the copy resizes it to the
    // image's exact dimensions.
    let image_surface = {
        let mut g = graphics.lock().unwrap();
        let id = g.create_drawing_surface(1, 1)?;
        load_image(&mut g, id)?;

        let replaced_proxy = proxy.clone();
        g.on_rendering_device_replaced(Box::new(move |g| {
            load_image(g, id)?;
            let _ = replaced_proxy.send_event(AppEvent::DeviceReplaced);
            Ok(())
        }));
        id
    };

    let fatal_proxy = proxy.clone();
    let _recovery = spawn_recovery(
        context.clone(),
        provider.clone(),
        graphics.clone(),
        Arc::new(move |err| {
            let _ = fatal_proxy.send_event(AppEvent::RecoveryFailed(format!("{err:#}")));
        }),
    );

    let mut brush = SurfaceBrush::new(context.device_arc(), config.format);
    let mut brush_generation = context.generation();
    drop(context);

    // Filled in when recovery gives up, so the process can exit non-zero
    // after the loop unwinds.
    let fatal: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let fatal_slot = fatal.clone();

    event_loop.run(move |event, target| match event {
        Event::WindowEvent {
            event: WindowEvent::CloseRequested,
            window_id,
        } if window_id == window.id() => {
            target.exit();
        }
        Event::WindowEvent {
            event: WindowEvent::Resized(new_size),
            window_id,
        } if window_id == window.id() => {
            size = new_size;
            if size.width > 0 && size.height > 0 {
                let g = graphics.lock().unwrap();
                config = make_surface_config(g.context().adapter(), &surface, size.width, size.height);
                surface.configure(g.context().device(), &config);
            }
            window.request_redraw();
        }
        Event::WindowEvent {
            event: WindowEvent::RedrawRequested,
            window_id,
        } if window_id == window.id() => {
            if size.width == 0 || size.height == 0 {
                return;
            }
            let g = graphics.lock().unwrap();

            // A replacement device means every frame resource is stale: the
            // swapchain, the brush pipeline and its atlas binding.
            if g.generation() != brush_generation {
                config = make_surface_config(g.context().adapter(), &surface, size.width, size.height);
                surface.configure(g.context().device(), &config);
                brush = SurfaceBrush::new(g.context().device_arc(), config.format);
                brush_generation = g.generation();
            }

            match surface.get_current_texture() {
                Ok(frame) => {
                    let view = frame
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    let bg = match (
                        g.surface_size(image_surface),
                        g.surface_offset(image_surface),
                    ) {
                        (Some(content), Some(offset)) => {
                            let placement = BrushPlacement::centered(
                                (size.width, size.height),
                                content,
                                offset,
                                g.atlas_size(),
                            );
                            brush.set_placement(g.context().queue(), placement);
                            Some(brush.bind_group(g.context().device(), g.atlas_view()))
                        }
                        _ => None,
                    };
                    let mut encoder = g.context().device().create_command_encoder(
                        &wgpu::CommandEncoderDescriptor {
                            label: Some("frame-encoder"),
                        },
                    );
                    {
                        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                            label: Some("frame-pass"),
                            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                                view: &view,
                                resolve_target: None,
                                ops: wgpu::Operations {
                                    load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                                    store: wgpu::StoreOp::Store,
                                },
                            })],
                            depth_stencil_attachment: None,
                            timestamp_writes: None,
                            occlusion_query_set: None,
                        });
                        if let Some(bg) = &bg {
                            brush.record(&mut pass, bg);
                        }
                    }
                    g.context().queue().submit(std::iter::once(encoder.finish()));
                    frame.present();
                }
                Err(err) => {
                    log::warn!("swapchain frame unavailable ({err}); reconfiguring");
                    config = make_surface_config(g.context().adapter(), &surface, size.width, size.height);
                    surface.configure(g.context().device(), &config);
                }
            }
        }
        Event::UserEvent(AppEvent::DeviceReplaced) => {
            window.request_redraw();
        }
        Event::UserEvent(AppEvent::RecoveryFailed(message)) => {
            log::error!("device recovery failed: {message}");
            *fatal_slot.lock().unwrap() = Some(message);
            target.exit();
        }
        Event::AboutToWait => {
            window.request_redraw();
        }
        _ => {}
    })?;

    if let Some(message) = fatal.lock().unwrap().take() {
        anyhow::bail!("device recovery failed: {message}");
    }
    Ok(())
}
