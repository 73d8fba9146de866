pub mod api;
pub mod attendance;
pub mod auth;
pub mod config;
pub mod db;
pub mod docs;
pub mod jobs;
pub mod model;
pub mod models;
pub mod repo;
pub mod routes;
pub mod utils;
