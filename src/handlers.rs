// src/handlers.rs

pub mod auth;
pub mod deliveries;
pub mod elements;
pub mod framvinda;
pub mod projects;
pub mod rebar;
