pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod ncbi;
pub mod normalize;
pub mod output;
pub mod rank;
pub mod store;
pub mod taxonomy;
pub mod validate;
