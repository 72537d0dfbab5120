pub mod actors;
pub mod catalog;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod metrics;
pub mod state;
pub mod store;
pub mod utils;
pub mod web;
