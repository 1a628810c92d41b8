#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod binning;
pub mod category;
pub mod config;
pub mod io;
pub mod pipeline;
pub mod preprocess;

#[path = "../model/mod.rs"]
pub mod model;
