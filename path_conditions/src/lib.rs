//! Turns a path graph into path constraints: backward def-use resolution of
//! the variables each branch compares, then one constraint per branch.

mod builder;
mod resolver;

pub use builder::{build, build_path_state};
pub use resolver::{hint_from, Query, Resolution, Resolver};
