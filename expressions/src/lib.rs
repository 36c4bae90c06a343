//! Typed constraint trees over the symbolic variables of a decompiled path.
mod definitions;
mod utils;

pub use definitions::*;
pub use utils::real_to_string;
