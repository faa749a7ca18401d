use std::collections::HashMap;

use thiserror::Error;

use crate::atlas::{AtlasAllocator, AtlasOffset};

/// Stable identity of a drawing surface. Survives resizes, atlas re-placement
/// and device replacement.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SurfaceId(u64);

#[derive(Debug, Error)]
pub enum DrawError {
    #[error("unknown drawing surface {0:?}")]
    UnknownSurface(SurfaceId),
    #[error("a draw session is already open for {0:?}")]
    AlreadyDrawing(SurfaceId),
    #[error("surface {0:?} has no atlas slot; resize must precede a draw session")]
    NotPlaced(SurfaceId),
    #[error("surface {id:?} of {width}x{height} cannot fit the atlas (device limit {limit})")]
    AtlasExhausted {
        id: SurfaceId,
        width: u32,
        height: u32,
        limit: u32,
    },
}

pub(crate) struct SurfaceState {
    pub size: (u32, u32),
    pub offset: Option<AtlasOffset>,
    pub in_draw: bool,
}

/// Exclusive draw access to a surface's atlas slot.
///
/// Holds the surface's "drawing" flag; dropping the session releases it
/// unconditionally, so the release happens even when the work done inside the
/// session fails. One session per surface at a time.
pub(crate) struct DrawSession<'a> {
    state: &'a mut SurfaceState,
    offset: AtlasOffset,
    id: SurfaceId,
}

impl<'a> DrawSession<'a> {
    pub fn begin(id: SurfaceId, state: &'a mut SurfaceState) -> Result<Self, DrawError> {
        if state.in_draw {
            return Err(DrawError::AlreadyDrawing(id));
        }
        let offset = state.offset.ok_or(DrawError::NotPlaced(id))?;
        state.in_draw = true;
        Ok(Self { state, offset, id })
    }

    /// Offset of this surface's pixels within the atlas for the duration of
    /// the session.
    pub fn offset(&self) -> AtlasOffset {
        self.offset
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.id
    }
}

impl Drop for DrawSession<'_> {
    fn drop(&mut self) {
        self.state.in_draw = false;
    }
}

/// Outcome of a (re)placement that the device-owning layer must act on.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum PlacementOutcome {
    /// The surface has a slot in the current atlas texture.
    InPlace,
    /// Every slot was re-placed into a grown atlas; the backing texture must
    /// be recreated at the new size and all surface content is invalid.
    AtlasGrown { width: u32, height: u32 },
}

/// CPU-side bookkeeping for all drawing surfaces sharing one atlas.
pub(crate) struct SurfaceRegistry {
    allocator: AtlasAllocator,
    surfaces: HashMap<SurfaceId, SurfaceState>,
    next_id: u64,
    /// Hard cap from the device's `max_texture_dimension_2d`.
    max_dimension: u32,
}

impl SurfaceRegistry {
    pub fn new(atlas_width: u32, atlas_height: u32, max_dimension: u32) -> Self {
        Self {
            allocator: AtlasAllocator::new(atlas_width, atlas_height),
            surfaces: HashMap::new(),
            next_id: 0,
            max_dimension,
        }
    }

    pub fn atlas_size(&self) -> (u32, u32) {
        self.allocator.size()
    }

    pub fn create(&mut self, width: u32, height: u32) -> Result<(SurfaceId, PlacementOutcome), DrawError> {
        let id = SurfaceId(self.next_id);
        self.next_id += 1;
        self.surfaces.insert(
            id,
            SurfaceState {
                size: (width, height),
                offset: None,
                in_draw: false,
            },
        );
        let outcome = self.place(id)?;
        Ok((id, outcome))
    }

    pub fn size_of(&self, id: SurfaceId) -> Option<(u32, u32)> {
        self.surfaces.get(&id).map(|s| s.size)
    }

    pub fn offset_of(&self, id: SurfaceId) -> Option<AtlasOffset> {
        self.surfaces.get(&id).and_then(|s| s.offset)
    }

    pub fn is_drawing(&self, id: SurfaceId) -> bool {
        self.surfaces.get(&id).is_some_and(|s| s.in_draw)
    }

    pub fn begin_draw(&mut self, id: SurfaceId) -> Result<DrawSession<'_>, DrawError> {
        let state = self
            .surfaces
            .get_mut(&id)
            .ok_or(DrawError::UnknownSurface(id))?;
        DrawSession::begin(id, state)
    }

    /// Resize a surface, re-placing its atlas slot. Returns what the owning
    /// layer must do about the backing texture.
    pub fn resize(
        &mut self,
        id: SurfaceId,
        width: u32,
        height: u32,
    ) -> Result<PlacementOutcome, DrawError> {
        let state = self
            .surfaces
            .get_mut(&id)
            .ok_or(DrawError::UnknownSurface(id))?;
        if state.in_draw {
            return Err(DrawError::AlreadyDrawing(id));
        }
        if state.size == (width, height) && state.offset.is_some() {
            return Ok(PlacementOutcome::InPlace);
        }
        state.size = (width, height);
        state.offset = None;
        self.place(id)
    }

    /// Drop every placement (the atlas texture itself was replaced, e.g. on a
    /// new device) and re-place all surfaces.
    pub fn invalidate_all(&mut self) -> Result<PlacementOutcome, DrawError> {
        self.allocator.reset();
        for state in self.surfaces.values_mut() {
            state.offset = None;
        }
        self.repack()
    }

    fn place(&mut self, id: SurfaceId) -> Result<PlacementOutcome, DrawError> {
        let state = self
            .surfaces
            .get_mut(&id)
            .ok_or(DrawError::UnknownSurface(id))?;
        let (w, h) = state.size;
        if let Some(offset) = self.allocator.allocate(w, h) {
            state.offset = Some(offset);
            return Ok(PlacementOutcome::InPlace);
        }
        // No room left; re-place everything, growing the atlas as needed.
        self.allocator.reset();
        for s in self.surfaces.values_mut() {
            s.offset = None;
        }
        self.repack()
    }

    fn repack(&mut self) -> Result<PlacementOutcome, DrawError> {
        let (start_w, start_h) = self.allocator.size();
        let (mut aw, mut ah) = (start_w, start_h);
        loop {
            self.allocator.reset_with_size(aw, ah);
            let mut ids: Vec<SurfaceId> = self.surfaces.keys().copied().collect();
            ids.sort();
            let mut all_placed = true;
            for id in &ids {
                let state = self.surfaces.get_mut(id).expect("id from keys");
                let (w, h) = state.size;
                match self.allocator.allocate(w, h) {
                    Some(offset) => state.offset = Some(offset),
                    None => {
                        if aw >= self.max_dimension && ah >= self.max_dimension {
                            return Err(DrawError::AtlasExhausted {
                                id: *id,
                                width: w,
                                height: h,
                                limit: self.max_dimension,
                            });
                        }
                        all_placed = false;
                        break;
                    }
                }
            }
            if all_placed {
                return if (aw, ah) == (start_w, start_h) {
                    Ok(PlacementOutcome::InPlace)
                } else {
                    Ok(PlacementOutcome::AtlasGrown {
                        width: aw,
                        height: ah,
                    })
                };
            }
            aw = (aw * 2).min(self.max_dimension);
            ah = (ah * 2).min(self.max_dimension);
            for s in self.surfaces.values_mut() {
                s.offset = None;
            }
        }
    }
}

impl PartialOrd for SurfaceId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SurfaceId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_places_surface() {
        let mut reg = SurfaceRegistry::new(256, 256, 2048);
        let (id, _) = reg.create(1, 1).unwrap();
        assert_eq!(reg.size_of(id), Some((1, 1)));
        assert!(reg.offset_of(id).is_some());
    }

    #[test]
    fn test_resize_updates_size_and_slot() {
        let mut reg = SurfaceRegistry::new(256, 256, 2048);
        let (id, _) = reg.create(1, 1).unwrap();
        reg.resize(id, 100, 50).unwrap();
        assert_eq!(reg.size_of(id), Some((100, 50)));
        let off = reg.offset_of(id).unwrap();
        assert!(off.x + 100 <= 256 && off.y + 50 <= 256);
    }

    #[test]
    fn test_draw_session_requires_placement_and_releases_on_drop() {
        let mut reg = SurfaceRegistry::new(256, 256, 2048);
        let (id, _) = reg.create(100, 50).unwrap();
        {
            let session = reg.begin_draw(id).unwrap();
            let off = session.offset();
            assert!(off.x + 100 <= 256);
        }
        assert!(!reg.is_drawing(id));
    }

    #[test]
    fn test_draw_session_released_even_when_copy_fails() {
        let mut reg = SurfaceRegistry::new(256, 256, 2048);
        let (id, _) = reg.create(100, 50).unwrap();
        let result: anyhow::Result<()> = (|| {
            let _session = reg.begin_draw(id)?;
            anyhow::bail!("simulated copy failure")
        })();
        assert!(result.is_err());
        // Release happened exactly once, on session drop.
        assert!(!reg.is_drawing(id));
        assert!(reg.begin_draw(id).is_ok());
    }

    #[test]
    fn test_second_session_is_rejected_while_first_is_open() {
        let mut reg = SurfaceRegistry::new(256, 256, 2048);
        let (a, _) = reg.create(10, 10).unwrap();
        let state = reg.surfaces.get_mut(&a).unwrap();
        let offset = state.offset;
        state.in_draw = true;
        assert!(matches!(
            reg.begin_draw(a),
            Err(DrawError::AlreadyDrawing(_))
        ));
        let state = reg.surfaces.get_mut(&a).unwrap();
        state.in_draw = false;
        assert_eq!(state.offset, offset);
    }

    #[test]
    fn test_resize_while_drawing_is_rejected() {
        let mut reg = SurfaceRegistry::new(256, 256, 2048);
        let (id, _) = reg.create(10, 10).unwrap();
        reg.surfaces.get_mut(&id).unwrap().in_draw = true;
        assert!(matches!(
            reg.resize(id, 20, 20),
            Err(DrawError::AlreadyDrawing(_))
        ));
    }

    #[test]
    fn test_atlas_grows_when_surface_outgrows_it() {
        let mut reg = SurfaceRegistry::new(64, 64, 2048);
        let (id, _) = reg.create(1, 1).unwrap();
        let outcome = reg.resize(id, 100, 50).unwrap();
        assert_eq!(
            outcome,
            PlacementOutcome::AtlasGrown {
                width: 128,
                height: 128
            }
        );
        assert_eq!(reg.size_of(id), Some((100, 50)));
    }

    #[test]
    fn test_atlas_exhaustion_is_fatal() {
        let mut reg = SurfaceRegistry::new(64, 64, 64);
        let (id, _) = reg.create(1, 1).unwrap();
        assert!(matches!(
            reg.resize(id, 100, 50),
            Err(DrawError::AtlasExhausted { .. })
        ));
    }

    #[test]
    fn test_invalidate_all_replaces_every_slot() {
        let mut reg = SurfaceRegistry::new(256, 256, 2048);
        let (a, _) = reg.create(100, 50).unwrap();
        let (b, _) = reg.create(30, 30).unwrap();
        reg.invalidate_all().unwrap();
        assert!(reg.offset_of(a).is_some());
        assert!(reg.offset_of(b).is_some());
    }
}
