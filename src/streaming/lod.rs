//! Detail level selection for a tile
//!
//! A tile may carry a cheap draft level and a full-detail main level. Which
//! of them is visible is a pure function of their readiness, the tile's
//! distance (in tiles) and a [`LodPolicy`].

use serde::{Deserialize, Serialize};

/// Thresholds controlling which detail level a tile shows
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LodPolicy {
    /// Tiles farther than this show their draft instead of main
    pub draft_switch_range: i32,
    /// Tiles farther than this are not generated in full
    pub generate_range: i32,
    /// Hide tiles beyond `generate_range` entirely
    pub hide_far_terrains: bool,
    /// Whether draft levels exist at all
    pub drafts_enabled: bool,
}

impl Default for LodPolicy {
    fn default() -> Self {
        Self {
            draft_switch_range: 1,
            generate_range: 3,
            hide_far_terrains: true,
            drafts_enabled: true,
        }
    }
}

/// Readiness flags of one detail level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LevelReadiness {
    pub generate_ready: bool,
    pub apply_ready: bool,
}

impl LevelReadiness {
    pub fn is_ready(&self) -> bool {
        self.generate_ready && self.apply_ready
    }
}

/// Everything the decision depends on
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LodInputs {
    /// `None` when the tile has no main level
    pub main: Option<LevelReadiness>,
    /// `None` when the tile has no draft level
    pub draft: Option<LevelReadiness>,
    pub distance: f32,
}

/// Which sink should be active
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LodChoice {
    #[default]
    None,
    Main,
    Draft,
}

/// Pick the visible detail level
///
/// With a draft available and drafts enabled, main wins only inside
/// `draft_switch_range` and only once fully applied; otherwise an applied
/// draft is shown unless hidden as far. Without a draft, an applied main is
/// shown unless hidden as far.
///
/// # Examples
/// ```
/// use terratile::streaming::lod::{decide_lod, LevelReadiness, LodChoice, LodInputs, LodPolicy};
///
/// let ready = LevelReadiness { generate_ready: true, apply_ready: true };
/// let pending = LevelReadiness::default();
/// let policy = LodPolicy::default();
///
/// let near = LodInputs { main: Some(pending), draft: Some(ready), distance: 0.5 };
/// assert_eq!(decide_lod(&policy, &near), LodChoice::Draft);
///
/// let near_done = LodInputs { main: Some(ready), ..near };
/// assert_eq!(decide_lod(&policy, &near_done), LodChoice::Main);
/// ```
pub fn decide_lod(policy: &LodPolicy, inputs: &LodInputs) -> LodChoice {
    // thresholds compare whole tiles
    let dist = inputs.distance as i32;
    let hidden_far = policy.hide_far_terrains && dist > policy.generate_range;
    let main_applied = inputs.main.is_some_and(|m| m.apply_ready);

    match inputs.draft {
        Some(draft) if policy.drafts_enabled => {
            if main_applied && dist <= policy.draft_switch_range {
                LodChoice::Main
            } else if draft.apply_ready && !hidden_far {
                LodChoice::Draft
            } else {
                LodChoice::None
            }
        }
        _ => {
            if main_applied && !hidden_far {
                LodChoice::Main
            } else {
                LodChoice::None
            }
        }
    }
}

/// Whether a generated but unapplied main level would be shown once applied
///
/// Used to defer main apply until the tile is close enough to need it.
pub fn main_apply_wanted(policy: &LodPolicy, inputs: &LodInputs) -> bool {
    let Some(main) = inputs.main else {
        return false;
    };
    if !main.generate_ready || main.apply_ready {
        return false;
    }
    let assumed = LodInputs {
        main: Some(LevelReadiness { generate_ready: true, apply_ready: true }),
        ..*inputs
    };
    decide_lod(policy, &assumed) == LodChoice::Main
}
