//! lumen-compositor: a small compositor layer over lumen-gfx.
//!
//! Responsibilities:
//! - Own the current rendering-device binding ([`GraphicsDevice`]) and fire
//!   "rendering device replaced" callbacks when it changes.
//! - Manage atlas-backed drawing surfaces with begin/end draw sessions and
//!   copy uploaded textures into them at the right atlas offset.
//! - Run the device-loss recovery loop that rebuilds and rebinds the device.

mod atlas;
mod brush;
mod graphics;
mod recovery;
mod surface;

pub use atlas::{AtlasAllocator, AtlasOffset};
pub use brush::{BrushPlacement, SurfaceBrush};
pub use graphics::{GraphicsDevice, ReplacedCallback};
pub use recovery::{REBUILD_BACKOFF, RecoveryState, rebuild_with_backoff, spawn_recovery};
pub use surface::{DrawError, SurfaceId};
