use super::{Dictionary, XRefSection};

/// One xref structure with its trailer dictionary. Documents updated
/// incrementally carry several, linked through `/Prev`; see [FrameSet].
#[derive(Debug, Clone)]
pub struct Frame {
    pub xref_pos: u32,
    pub trailer: Dictionary,
    pub xref_section: XRefSection,
}

impl Frame {
    pub fn new(xref_pos: u32, trailer: Dictionary, xref_section: XRefSection) -> Self {
        Self {
            xref_pos,
            trailer,
            xref_section,
        }
    }
}

/// Newest frame first.
pub type FrameSet = Vec<Frame>;
