//! Educa - A lightweight online course platform
//!
//! Instructors author courses made of ordered modules holding text, video,
//! image and file content. Students browse the catalog, enroll and follow
//! the material.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
