pub mod api;
pub mod app;
pub mod capture;
pub mod cli;
pub mod config;
pub mod controller;
pub mod db;
pub mod global;
pub mod media;
pub mod persist;
