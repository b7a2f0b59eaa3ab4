//! Comparison view engine
//!
//! Pure contain-fit geometry plus the slide/hold compositor used to
//! compare the staged input against the computed output.

mod comparison;
mod geometry;

pub use comparison::{Availability, ComparisonMode, ComparisonView};
pub use geometry::{contain_fit, Rect, Size};
