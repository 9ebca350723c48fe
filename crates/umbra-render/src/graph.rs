//! The fixed pass order and the per-frame dependency ledger.
//!
//! Every pass declares the targets it reads and writes. The renderer opens
//! a [`FrameLedger`] at the start of each frame and asks it before every
//! pass; a pass whose inputs were not written earlier in the same frame is
//! refused with [`RenderError::MissingInput`].

use rustc_hash::FxHashSet;

use crate::error::RenderError;
use crate::targets::TargetId;

const SHADOWS: [TargetId; 3] = [TargetId::Shadow(0), TargetId::Shadow(1), TargetId::Shadow(2)];

/// One stage of the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Depth-only geometry into every cascade.
    Shadow,
    /// Opaque, skinned, instanced, terrain and sea geometry into the G-buffer.
    Geometry,
    /// Screen-space ambient occlusion.
    Occlusion,
    /// Lighting and composition into the HDR buffer.
    Lighting,
    /// HDR to LDR with adaptive exposure.
    ToneMap,
    /// Color correction, vignetting and glitch, ping-ponging the LDR buffers.
    PostEffects,
    /// Debug primitives and the paint brush, never tone mapped.
    Overlay,
}

impl PassKind {
    /// Execution order.
    pub const ORDER: [PassKind; 7] = [
        PassKind::Shadow,
        PassKind::Geometry,
        PassKind::Occlusion,
        PassKind::Lighting,
        PassKind::ToneMap,
        PassKind::PostEffects,
        PassKind::Overlay,
    ];

    /// Targets that must be written before this pass starts.
    pub fn reads(self) -> &'static [TargetId] {
        match self {
            PassKind::Shadow | PassKind::Geometry => &[],
            PassKind::Occlusion => &[TargetId::GBuffer],
            PassKind::Lighting => &[
                TargetId::GBuffer,
                TargetId::Occlusion,
                TargetId::Shadow(0),
                TargetId::Shadow(1),
                TargetId::Shadow(2),
            ],
            PassKind::ToneMap => &[TargetId::Hdr],
            PassKind::PostEffects | PassKind::Overlay => &[TargetId::LdrFront],
        }
    }

    /// Targets this pass leaves fully written.
    pub fn writes(self) -> &'static [TargetId] {
        match self {
            PassKind::Shadow => &SHADOWS,
            PassKind::Geometry => &[TargetId::GBuffer],
            PassKind::Occlusion => &[TargetId::Occlusion],
            PassKind::Lighting => &[TargetId::Hdr],
            PassKind::ToneMap => &[TargetId::LdrFront],
            PassKind::PostEffects => &[TargetId::LdrBack, TargetId::LdrFront],
            PassKind::Overlay => &[TargetId::LdrFront],
        }
    }
}

/// Which targets have been written so far this frame.
#[derive(Debug, Default)]
pub struct FrameLedger {
    written: FxHashSet<TargetId>,
    executed: Vec<PassKind>,
}

impl FrameLedger {
    /// An empty ledger for a new frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that every input of `pass` has been written.
    pub fn begin(&self, pass: PassKind) -> Result<(), RenderError> {
        match pass.reads().iter().find(|t| !self.written.contains(t)) {
            Some(&target) => Err(RenderError::MissingInput { pass, target }),
            None => Ok(()),
        }
    }

    /// Record that `pass` finished and wrote its outputs.
    pub fn complete(&mut self, pass: PassKind) {
        self.written.extend(pass.writes().iter().copied());
        self.executed.push(pass);
    }

    /// Returns true if `target` was written this frame.
    pub fn is_written(&self, target: TargetId) -> bool {
        self.written.contains(&target)
    }

    /// Passes completed so far, in order.
    pub fn executed(&self) -> &[PassKind] {
        &self.executed
    }

    /// Take the executed pass list, leaving the ledger empty.
    pub fn into_executed(self) -> Vec<PassKind> {
        self.executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_order_satisfies_every_dependency() {
        let mut ledger = FrameLedger::new();
        for pass in PassKind::ORDER {
            ledger.begin(pass).expect("ordered pass must have its inputs");
            ledger.complete(pass);
        }
        assert_eq!(ledger.executed(), &PassKind::ORDER);
        for target in TargetId::ALL {
            assert!(ledger.is_written(target), "{target:?} never written");
        }
    }

    #[test]
    fn test_lighting_refused_without_occlusion() {
        let mut ledger = FrameLedger::new();
        ledger.complete(PassKind::Shadow);
        ledger.complete(PassKind::Geometry);
        let err = ledger.begin(PassKind::Lighting).unwrap_err();
        assert!(matches!(
            err,
            RenderError::MissingInput {
                pass: PassKind::Lighting,
                target: TargetId::Occlusion
            }
        ));
    }

    #[test]
    fn test_tonemap_refused_on_fresh_frame() {
        let ledger = FrameLedger::new();
        assert!(ledger.begin(PassKind::ToneMap).is_err());
        assert!(ledger.begin(PassKind::Geometry).is_ok());
    }

    /// Every pass only reads targets written by strictly earlier passes.
    #[test]
    fn test_reads_come_from_earlier_writes() {
        for (i, pass) in PassKind::ORDER.iter().enumerate() {
            for target in pass.reads() {
                let producer = PassKind::ORDER[..i]
                    .iter()
                    .any(|earlier| earlier.writes().contains(target));
                assert!(producer, "{pass:?} reads {target:?} with no earlier writer");
            }
        }
    }
}
