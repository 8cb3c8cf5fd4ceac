pub mod config;
pub mod context;
pub(crate) mod fs_utils;
pub mod logging;
