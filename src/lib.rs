pub mod api;
pub mod config;
pub mod controller;
pub mod domain;
pub mod integrations;
pub mod telemetry;
