/// Offset of a surface's pixels within the shared atlas texture.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AtlasOffset {
    pub x: u32,
    pub y: u32,
}

struct Shelf {
    y: u32,
    height: u32,
    cursor_x: u32,
}

/// Shelf packer for the atlas backing texture.
///
/// Surfaces are placed left to right on horizontal shelves; a new shelf opens
/// below the last one when no existing shelf fits. There is no per-slot free:
/// the registry re-places every surface from a clean allocator when space
/// runs out, which is what makes atlas offsets unstable across draw sessions.
pub struct AtlasAllocator {
    width: u32,
    height: u32,
    shelves: Vec<Shelf>,
    next_shelf_y: u32,
}

impl AtlasAllocator {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            shelves: Vec::new(),
            next_shelf_y: 0,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Allocate a `width` x `height` slot, or `None` when the atlas is full.
    pub fn allocate(&mut self, width: u32, height: u32) -> Option<AtlasOffset> {
        if width == 0 || height == 0 || width > self.width || height > self.height {
            return None;
        }
        for shelf in &mut self.shelves {
            if shelf.height >= height && shelf.cursor_x + width <= self.width {
                let offset = AtlasOffset {
                    x: shelf.cursor_x,
                    y: shelf.y,
                };
                shelf.cursor_x += width;
                return Some(offset);
            }
        }
        if self.next_shelf_y + height > self.height {
            return None;
        }
        let offset = AtlasOffset {
            x: 0,
            y: self.next_shelf_y,
        };
        self.shelves.push(Shelf {
            y: self.next_shelf_y,
            height,
            cursor_x: width,
        });
        self.next_shelf_y += height;
        Some(offset)
    }

    /// Forget all placements. Used before re-placing every surface.
    pub fn reset(&mut self) {
        self.shelves.clear();
        self.next_shelf_y = 0;
    }

    /// Reset with a new backing size (after the atlas texture was grown).
    pub fn reset_with_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_stay_in_bounds() {
        let mut alloc = AtlasAllocator::new(256, 256);
        for _ in 0..4 {
            let off = alloc.allocate(100, 50).unwrap();
            assert!(off.x + 100 <= 256);
            assert!(off.y + 50 <= 256);
        }
    }

    #[test]
    fn test_allocations_do_not_overlap() {
        let mut alloc = AtlasAllocator::new(256, 256);
        let a = alloc.allocate(100, 50).unwrap();
        let b = alloc.allocate(100, 50).unwrap();
        let disjoint_x = a.x + 100 <= b.x || b.x + 100 <= a.x;
        let disjoint_y = a.y + 50 <= b.y || b.y + 50 <= a.y;
        assert!(disjoint_x || disjoint_y);
    }

    #[test]
    fn test_full_atlas_returns_none() {
        let mut alloc = AtlasAllocator::new(64, 64);
        assert!(alloc.allocate(64, 64).is_some());
        assert!(alloc.allocate(1, 1).is_none());
    }

    #[test]
    fn test_oversized_request_fails() {
        let mut alloc = AtlasAllocator::new(64, 64);
        assert!(alloc.allocate(65, 1).is_none());
        assert!(alloc.allocate(0, 10).is_none());
    }

    #[test]
    fn test_reset_reclaims_space() {
        let mut alloc = AtlasAllocator::new(64, 64);
        assert!(alloc.allocate(64, 64).is_some());
        alloc.reset();
        assert_eq!(alloc.allocate(64, 64), Some(AtlasOffset { x: 0, y: 0 }));
    }
}
