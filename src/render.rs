//! Display snapshots published by a session after every step.

use std::fmt;

/// Width of the CHIP-8 framebuffer in pixels.
pub const DISPLAY_WIDTH: usize = 64;
/// Height of the CHIP-8 framebuffer in pixels.
pub const DISPLAY_HEIGHT: usize = 32;
/// Number of pixels in a [`RenderContext`].
pub const PIXEL_COUNT: usize = DISPLAY_WIDTH * DISPLAY_HEIGHT;
/// Number of general purpose registers (`V0` - `VF`).
pub const REGISTER_COUNT: usize = 16;

/// An immutable snapshot of machine-visible state: the program title, the sixteen
/// registers and the 64x32 monochrome framebuffer (row-major).
///
/// A new [`RenderContext`] replaces the previous one wholesale; nothing carries over
/// between snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    title: String,
    registries: [u8; REGISTER_COUNT],
    pixels: Box<[bool; PIXEL_COUNT]>,
}

impl RenderContext {
    /// Creates a new [`RenderContext`] from buffers that already have the right shape.
    pub fn new(
        title: impl Into<String>,
        registries: [u8; REGISTER_COUNT],
        pixels: Box<[bool; PIXEL_COUNT]>,
    ) -> Self {
        Self {
            title: title.into(),
            registries,
            pixels,
        }
    }

    /// A snapshot with every register zeroed and every pixel dark.
    pub fn blank(title: impl Into<String>) -> Self {
        Self::new(title, [0; REGISTER_COUNT], Box::new([false; PIXEL_COUNT]))
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn registries(&self) -> &[u8; REGISTER_COUNT] {
        &self.registries
    }

    pub fn pixels(&self) -> &[bool; PIXEL_COUNT] {
        &self.pixels
    }

    /// The pixel at column `x`, row `y`, or `None` if the coordinate is off-screen.
    pub fn pixel(&self, x: usize, y: usize) -> Option<bool> {
        if x >= DISPLAY_WIDTH || y >= DISPLAY_HEIGHT {
            return None;
        }
        Some(self.pixels[y * DISPLAY_WIDTH + x])
    }

    /// Iterates over the framebuffer one row at a time, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[bool]> {
        self.pixels.chunks(DISPLAY_WIDTH)
    }

    /// Number of lit pixels.
    pub fn lit(&self) -> usize {
        self.pixels.iter().filter(|&&on| on).count()
    }
}

/// Draws the title above a boxed framebuffer, two columns per pixel.
impl fmt::Display for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "╭{}╮", "──".repeat(DISPLAY_WIDTH))?;
        for row in self.rows() {
            write!(f, "│")?;
            for &on in row {
                f.write_str(if on { "██" } else { "  " })?;
            }
            writeln!(f, "│")?;
        }
        write!(f, "╰{}╯", "──".repeat(DISPLAY_WIDTH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_shape() {
        let ctx = RenderContext::blank("DEMO");
        assert_eq!(ctx.title(), "DEMO");
        assert_eq!(ctx.registries().len(), REGISTER_COUNT);
        assert_eq!(ctx.pixels().len(), PIXEL_COUNT);
        assert_eq!(ctx.lit(), 0);
        assert_eq!(ctx.rows().count(), DISPLAY_HEIGHT);
    }

    #[test]
    fn test_pixel_lookup() {
        let mut pixels = Box::new([false; PIXEL_COUNT]);
        pixels[DISPLAY_WIDTH + 3] = true;
        let ctx = RenderContext::new("x", [7; REGISTER_COUNT], pixels);
        assert_eq!(ctx.registries()[15], 7);
        assert_eq!(ctx.pixel(3, 1), Some(true));
        assert_eq!(ctx.pixel(3, 0), Some(false));
        assert_eq!(ctx.pixel(DISPLAY_WIDTH, 0), None);
        assert_eq!(ctx.lit(), 1);
    }

    #[test]
    fn test_display_frames_every_row() {
        let rendered = RenderContext::blank("IBM").to_string();
        let lines: Vec<_> = rendered.lines().collect();
        // title + top border + rows + bottom border
        assert_eq!(lines.len(), DISPLAY_HEIGHT + 3);
        assert_eq!(lines[0], "IBM");
    }
}
