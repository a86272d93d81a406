//! Rendering surface interface and the host-side framebuffer

use anyhow::Result;

/// Packed RGBA frame owned by the host.
///
/// Dimensions are fixed when the session starts. The core's buffer is
/// copied in each tick; the dirty flag tells the pump whether an upload is
/// needed.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    dirty: bool,
}

impl Framebuffer {
    /// Black frame, marked dirty so the first present shows something
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
            dirty: true,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Bytes per row
    pub fn stride(&self) -> u32 {
        self.width * 4
    }

    /// Copy a full frame in and mark dirty.
    ///
    /// Returns `false` (and leaves the frame untouched) on a size mismatch.
    pub fn copy_from(&mut self, src: &[u8]) -> bool {
        if src.len() != self.pixels.len() {
            return false;
        }
        self.pixels.copy_from_slice(src);
        self.dirty = true;
        true
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

/// Host display target driven by the frame pump
pub trait RenderSurface {
    /// Stage a new frame for the next present
    fn upload(&mut self, frame: &Framebuffer) -> Result<()>;

    /// Show the most recently uploaded frame
    fn present(&mut self) -> Result<()>;
}

/// Surface that drops every frame; for headless runs and tests
#[derive(Debug, Default)]
pub struct NullSurface {
    pub uploads: u64,
    pub presents: u64,
}

impl RenderSurface for NullSurface {
    fn upload(&mut self, _frame: &Framebuffer) -> Result<()> {
        self.uploads += 1;
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.presents += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_is_black_and_dirty() {
        let frame = Framebuffer::new(3, 2);

        assert_eq!(frame.pixels().len(), 24);
        assert_eq!(frame.stride(), 12);
        assert!(frame.pixels().iter().all(|&b| b == 0));
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_copy_from_copies_and_marks_dirty() {
        let mut frame = Framebuffer::new(1, 1);
        frame.clear_dirty();
        let mut src = vec![1, 2, 3, 4];

        assert!(frame.copy_from(&src));
        src[0] = 99;

        assert_eq!(frame.pixels(), &[1, 2, 3, 4]);
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_copy_from_rejects_wrong_size() {
        let mut frame = Framebuffer::new(1, 1);
        frame.clear_dirty();

        assert!(!frame.copy_from(&[1, 2, 3]));
        assert_eq!(frame.pixels(), &[0, 0, 0, 0]);
        assert!(!frame.is_dirty());
    }
}
