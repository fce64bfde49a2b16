// src/services.rs

pub mod auth;
pub mod delivery_service;
pub mod element_service;
pub mod framvinda_calculator;
pub mod framvinda_service;
pub mod project_service;
pub mod rebar_service;
