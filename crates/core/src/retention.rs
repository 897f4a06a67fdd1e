use crate::Artifact;

/// Count-cap eviction candidates.
///
/// `artifacts` must be ordered newest first; everything beyond position
/// `cap` is a candidate. `cap = 0` marks every artifact (no minimum-keep
/// floor is imposed here); `cap >= len` marks none. Pure, no I/O: callers
/// decide what to do with the candidates.
pub fn eviction_candidates(artifacts: &[Artifact], cap: usize) -> &[Artifact] {
    if cap >= artifacts.len() {
        &[]
    } else {
        &artifacts[cap..]
    }
}
