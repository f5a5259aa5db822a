//! Settlement segmentation inference service
//!
//! Accepts zipped satellite-imagery tiles, runs a segmentation model on them
//! in the background, stitches the per-tile predictions into one
//! georeferenced overlay and exposes pollable job progress over HTTP.

pub mod app_state;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
