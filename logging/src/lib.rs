mod logging;
mod raise_error;

pub use crate::logging::{level_for, Logger};
pub use crate::raise_error::{format_error, raise_error};
