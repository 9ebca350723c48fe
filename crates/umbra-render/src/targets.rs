//! Render target identities and sizes.

use crate::shadow::CASCADE_COUNT;

/// One of the renderer-owned render targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetId {
    /// Diffuse, normal and depth written by the geometry pass.
    GBuffer,
    /// Ambient occlusion factor.
    Occlusion,
    /// Linear HDR color from the lighting pass.
    Hdr,
    /// LDR ping-pong buffer holding the final image after post effects.
    LdrFront,
    /// LDR ping-pong scratch buffer.
    LdrBack,
    /// Depth of one shadow cascade, nearest first.
    Shadow(u8),
}

impl TargetId {
    /// Every target, in creation order.
    pub const ALL: [TargetId; 5 + CASCADE_COUNT] = [
        TargetId::GBuffer,
        TargetId::Occlusion,
        TargetId::Hdr,
        TargetId::LdrFront,
        TargetId::LdrBack,
        TargetId::Shadow(0),
        TargetId::Shadow(1),
        TargetId::Shadow(2),
    ];

    /// The shadow target of a cascade.
    pub fn shadow(cascade: usize) -> Self {
        debug_assert!(cascade < CASCADE_COUNT);
        TargetId::Shadow(cascade as u8)
    }
}

/// Pixel sizes of the full target set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetLayout {
    /// Screen-sized target width.
    pub width: u32,
    /// Screen-sized target height.
    pub height: u32,
    /// Square shadow map edge per cascade.
    pub shadow_resolutions: [u32; CASCADE_COUNT],
}

impl TargetLayout {
    /// Build a layout, clamping every dimension to at least one pixel.
    pub fn new(width: u32, height: u32, shadow_resolutions: [u32; CASCADE_COUNT]) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            shadow_resolutions: shadow_resolutions.map(|r| r.max(1)),
        }
    }

    /// Width and height of one target.
    pub fn size_of(&self, id: TargetId) -> (u32, u32) {
        match id {
            TargetId::Shadow(i) => {
                let r = self.shadow_resolutions[i as usize];
                (r, r)
            }
            _ => (self.width, self.height),
        }
    }

    /// Screen aspect ratio.
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_clamps_zero_dimensions() {
        let layout = TargetLayout::new(0, 0, [0, 512, 256]);
        assert_eq!(layout.size_of(TargetId::Hdr), (1, 1));
        assert_eq!(layout.size_of(TargetId::Shadow(0)), (1, 1));
        assert_eq!(layout.size_of(TargetId::Shadow(2)), (256, 256));
    }

    #[test]
    fn test_all_targets_are_distinct() {
        let mut ids = TargetId::ALL.to_vec();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), TargetId::ALL.len());
    }
}
