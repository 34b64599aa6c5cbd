//! Target rating for an interaction
//!
//! An explicit rating wins. Otherwise the interaction kind maps to an
//! implicit rating: ordering is the strongest signal, a plain view the
//! weakest. Unknown kinds get the midpoint.

use makanmate_ai_core::{InteractionKind, InteractionRecord};

pub const ORDER_RATING: f32 = 5.0;
pub const LIKE_RATING: f32 = 4.0;
pub const BOOKMARK_RATING: f32 = 3.5;
pub const VIEW_RATING: f32 = 2.0;
pub const DEFAULT_RATING: f32 = 3.0;

/// Implicit rating for an interaction kind.
pub fn implicit_rating(kind: &InteractionKind) -> f32 {
    match kind {
        InteractionKind::Order => ORDER_RATING,
        InteractionKind::Like => LIKE_RATING,
        InteractionKind::Bookmark => BOOKMARK_RATING,
        InteractionKind::View => VIEW_RATING,
        InteractionKind::Rate | InteractionKind::Other(_) => DEFAULT_RATING,
    }
}

/// Resolve the training target for one interaction. Never fails.
pub fn resolve_rating(interaction: &InteractionRecord) -> f32 {
    interaction
        .rating
        .unwrap_or_else(|| implicit_rating(&interaction.kind))
}
