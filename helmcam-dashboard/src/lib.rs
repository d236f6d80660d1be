//! Reconciliation layer of the HelmCam receiver dashboard.

pub mod alerts;
pub mod commands;
pub mod config;
pub mod health;
pub mod http;
pub mod models;
pub mod pacer;
pub mod poller;
pub mod reconciler;
pub mod registry;
pub mod render;
pub mod transport;
