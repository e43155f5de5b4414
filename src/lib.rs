pub mod api;
pub mod archive;
pub mod config;
pub mod db;
pub mod pipeline;
pub mod plant_api;
pub mod transform;
