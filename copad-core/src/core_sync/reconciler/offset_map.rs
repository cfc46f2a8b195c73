/*
    offset_map.rs - Flat offset to text-run position mapping

    The editable surface stores text as an ordered sequence of runs (text
    nodes). Selection offsets are captured flat, as character counts from
    the start of the surface; after a content replacement they must be
    mapped back onto whichever runs now exist.
*/

/// A position inside the surface's run structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPosition {
    /// Index into the ordered run sequence
    pub run_index: usize,
    /// Character offset inside that run
    pub offset: usize,
}

/// Map a flat character offset onto the run sequence.
///
/// Walks runs in order accumulating lengths; the target run is the first
/// whose cumulative length reaches the offset, and the in-run offset is the
/// remainder. Returns `None` when the offset lies beyond the total length
/// (content shrank), in which case restoration is a no-op and the surface
/// keeps its default end-of-content caret.
pub fn locate<S: AsRef<str>>(flat_offset: usize, runs: &[S]) -> Option<RunPosition> {
    let mut consumed = 0usize;
    for (run_index, run) in runs.iter().enumerate() {
        let len = run.as_ref().chars().count();
        if consumed + len >= flat_offset {
            return Some(RunPosition {
                run_index,
                offset: flat_offset - consumed,
            });
        }
        consumed += len;
    }
    None
}
