//! Decoder implementation selection.
//!
//! For a codec, every implementation the backend knows about is expanded into
//! one candidate per supported hardware kind that is still allowed, plus one
//! software candidate for the first implementation. Candidates are then ranked by
//! a fixed priority table so the most dependable accelerator is tried first.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};
use symphonia::core::codecs::CodecType;

use crate::audio::backend::MediaBackend;

/// Hardware device kinds a decoder implementation may run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareKind {
    Vdpau,
    Cuda,
    Vaapi,
    Dxva2,
    Qsv,
    MediaCodec,
    VideoToolbox,
}

impl HardwareKind {
    pub const ALL: [HardwareKind; 7] = [
        HardwareKind::Vdpau,
        HardwareKind::Cuda,
        HardwareKind::Vaapi,
        HardwareKind::Dxva2,
        HardwareKind::Qsv,
        HardwareKind::MediaCodec,
        HardwareKind::VideoToolbox,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareKind::Vdpau => "vdpau",
            HardwareKind::Cuda => "cuda",
            HardwareKind::Vaapi => "vaapi",
            HardwareKind::Dxva2 => "dxva2",
            HardwareKind::Qsv => "qsv",
            HardwareKind::MediaCodec => "mediacodec",
            HardwareKind::VideoToolbox => "videotoolbox",
        }
    }
}

impl std::fmt::Display for HardwareKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority of a candidate; higher is tried first
pub fn score(hardware: Option<HardwareKind>) -> i32 {
    match hardware {
        Some(HardwareKind::Vdpau) | Some(HardwareKind::Cuda) | Some(HardwareKind::MediaCodec) => 10,
        Some(HardwareKind::Vaapi) | Some(HardwareKind::Qsv) => 9,
        Some(HardwareKind::Dxva2) => 8,
        Some(HardwareKind::VideoToolbox) | None => i32::MIN,
    }
}

/// A decoder implementation known to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderDescriptor {
    pub name: String,
    pub codec: CodecType,
    /// Hardware kinds this implementation can drive, in the backend's order
    pub hardware: Vec<HardwareKind>,
}

impl DecoderDescriptor {
    pub fn software(name: impl Into<String>, codec: CodecType) -> Self {
        Self {
            name: name.into(),
            codec,
            hardware: Vec::new(),
        }
    }
}

/// One (implementation, hardware kind) pairing to attempt
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderCandidate {
    pub descriptor: DecoderDescriptor,
    /// `None` means plain software decoding
    pub hardware: Option<HardwareKind>,
}

impl DecoderCandidate {
    pub fn score(&self) -> i32 {
        score(self.hardware)
    }

    pub fn label(&self) -> String {
        match self.hardware {
            Some(kind) => format!("{} ({})", self.descriptor.name, kind),
            None => format!("{} (software)", self.descriptor.name),
        }
    }
}

/// Rank the decoder implementations `backend` offers for `codec`
pub fn available_decoders(
    backend: &dyn MediaBackend,
    codec: CodecType,
    targets: &[HardwareKind],
) -> Vec<DecoderCandidate> {
    rank_candidates(backend.decoders_for(codec), codec, targets)
}

/// Expand descriptors into candidates and sort them by descending score.
///
/// With no allowed hardware only the first matching implementation is
/// considered. Kinds without a score (VideoToolbox) are never tried. The sort
/// is stable, so ties keep enumeration order.
pub fn rank_candidates(
    descriptors: Vec<DecoderDescriptor>,
    codec: CodecType,
    targets: &[HardwareKind],
) -> Vec<DecoderCandidate> {
    let mut candidates = Vec::new();
    let mut first = None;

    for descriptor in descriptors.into_iter().filter(|d| d.codec == codec) {
        if first.is_none() {
            first = Some(descriptor.clone());
        }
        if targets.is_empty() {
            break;
        }
        let usable = descriptor
            .hardware
            .iter()
            .filter(|kind| targets.contains(kind) && score(Some(**kind)) > i32::MIN);
        for kind in usable {
            candidates.push(DecoderCandidate {
                descriptor: descriptor.clone(),
                hardware: Some(*kind),
            });
        }
    }

    if let Some(descriptor) = first {
        candidates.push(DecoderCandidate {
            descriptor,
            hardware: None,
        });
    }

    candidates.sort_by_key(|candidate| Reverse(candidate.score()));
    candidates
}
