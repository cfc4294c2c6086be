//! HTTP surface and configuration for the failure prediction engine

pub mod api;
pub mod config;
