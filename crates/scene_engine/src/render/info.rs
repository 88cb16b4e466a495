//! Frame statistics

use crate::render::api::DrawMode;

/// Counters describing the last rendered frame
///
/// `calls`, `triangles`, `lines` and `points` are reset at the start of
/// every frame; `programs` and `geometries` report live cache sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderInfo {
    /// Frames rendered so far
    pub frame: u64,
    /// Draw calls issued
    pub calls: usize,
    /// Triangles submitted
    pub triangles: usize,
    /// Line segments submitted
    pub lines: usize,
    /// Points submitted
    pub points: usize,
    /// Entries skipped because their program was still compiling
    pub pending: usize,
    /// Programs in the cache
    pub programs: usize,
    /// Geometries with uploaded buffers
    pub geometries: usize,
}

impl RenderInfo {
    /// Clear per-frame counters
    pub fn reset(&mut self) {
        self.calls = 0;
        self.triangles = 0;
        self.lines = 0;
        self.points = 0;
        self.pending = 0;
    }

    /// Account for one draw of `count` elements repeated `instances` times
    pub fn record_draw(&mut self, mode: DrawMode, count: usize, instances: usize) {
        self.calls += 1;
        match mode {
            DrawMode::Triangles => self.triangles += instances * (count / 3),
            DrawMode::Lines => self.lines += instances * (count / 2),
            DrawMode::LineStrip => self.lines += instances * count.saturating_sub(1),
            DrawMode::LineLoop => self.lines += instances * count,
            DrawMode::Points => self.points += instances * count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_counts() {
        let mut info = RenderInfo::default();
        info.record_draw(DrawMode::Triangles, 6, 1);
        info.record_draw(DrawMode::Triangles, 3, 4);
        info.record_draw(DrawMode::LineStrip, 5, 1);
        info.record_draw(DrawMode::LineLoop, 5, 1);
        info.record_draw(DrawMode::Points, 10, 2);

        assert_eq!(info.calls, 5);
        assert_eq!(info.triangles, 6);
        assert_eq!(info.lines, 9);
        assert_eq!(info.points, 20);
    }

    #[test]
    fn test_reset_keeps_frame_and_cache_sizes() {
        let mut info = RenderInfo { frame: 3, programs: 2, geometries: 1, ..RenderInfo::default() };
        info.record_draw(DrawMode::Lines, 4, 1);
        info.reset();

        assert_eq!(info, RenderInfo { frame: 3, programs: 2, geometries: 1, ..RenderInfo::default() });
    }
}
