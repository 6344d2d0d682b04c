//! SWF to SVG bridging.
//!
//! Frame generation is delegated to an external reader; the loader only
//! packages what the collaborator produces: the header SVG becomes the
//! stream configuration, each frame's SVG text becomes a sample payload.

use media_types::Result;

/// One SVG frame produced by the external reader.
#[derive(Debug, Clone, PartialEq)]
pub struct SwfFrame {
    /// Frame timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Random access point (a full redraw rather than a delta).
    pub is_rap: bool,
    /// Serialized SVG for the frame.
    pub svg: String,
}

/// The external SWF reader collaborator.
pub trait SwfReader {
    /// Returns the header SVG, emitted once as the codec configuration.
    fn header_svg(&mut self) -> Result<String>;

    /// Returns the next frame, or `None` at end of animation.
    fn next_frame(&mut self) -> Result<Option<SwfFrame>>;

    /// Frame rate and total frame count, when known (duration probing).
    fn duration(&self) -> Option<(u32, u32)> {
        None
    }
}
