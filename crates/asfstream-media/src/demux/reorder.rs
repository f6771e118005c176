//! Audio-spread de-interleaving.

use crate::format::ReorderParams;

/// Undo the audio-spread interleave of `data` in place.
///
/// Each full group of `height × width` blocks is read row-major and written
/// column-major. A trailing partial group is left untouched.
pub fn deinterleave(params: &ReorderParams, data: &mut [u8]) {
    let ReorderParams { height, width, block } = *params;
    let group = height * width * block;
    if group == 0 || data.len() < group {
        return;
    }

    let mut out = Vec::with_capacity(data.len() - data.len() % group);
    for src in data.chunks_exact(group) {
        for x in 0..width {
            for y in 0..height {
                let at = (y * width + x) * block;
                out.extend_from_slice(&src[at..at + block]);
            }
        }
    }
    data[..out.len()].copy_from_slice(&out);
}
