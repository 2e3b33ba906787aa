pub mod archive;
pub mod assets;
pub mod config;
pub mod error;
pub mod imports;
pub mod layout;
pub mod logging;
pub mod materialize;
pub mod mirror;
pub mod pipeline;
pub mod profile;
pub mod rewrite;
pub mod target;
pub mod tools;
pub mod walk;

#[cfg(test)]
mod testing;
