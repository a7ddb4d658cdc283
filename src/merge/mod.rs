pub mod audit;
pub mod config;
pub mod datatype;
pub mod dedup;
pub mod loader;
pub mod manifest;
pub mod media;
pub mod merger;
pub mod normalize;
pub mod orchestrator;
pub mod paths;
pub mod progress;
pub mod record;
pub mod util;
pub mod warn;
