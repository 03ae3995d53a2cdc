//! FichaPro Library
//!
//! Restaurant costing back office: ingredients, recipes and technical sheets
//! with cost, yield and suggested price calculation.

pub mod auth;
pub mod build_info;
pub mod config;
pub mod costing;
pub mod db;
pub mod mcp;
pub mod models;
pub mod tools;
