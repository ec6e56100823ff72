//! Scheduling priorities
//!
//! Higher values run first. Priorities derive from tile remoteness so nearer
//! tiles preempt farther ones; drafts get a flat boost over any main level.

/// Added to draft priorities so previews always come before full detail
pub const DRAFT_PRIORITY_BOOST: i32 = 1000;

/// Integer priority from a tile distance (in tiles)
///
/// # Example
/// ```
/// use terratile::streaming::priority::priority_from_distance;
/// assert!(priority_from_distance(0.5) > priority_from_distance(3.0));
/// ```
pub fn priority_from_distance(distance: f32) -> i32 {
    (-distance * 100.0) as i32
}

/// Priority of a generation task or apply step for one detail level
pub fn level_priority(distance: f32, draft: bool) -> i32 {
    let base = priority_from_distance(distance);
    if draft { base + DRAFT_PRIORITY_BOOST } else { base }
}
