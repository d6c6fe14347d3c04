pub mod calendar;
pub mod components;
pub mod config;
pub mod error;
pub mod shutdown;
pub mod startup;
pub mod tree;
pub mod utils;
