pub mod auth;
pub mod delivery;
pub mod element;
pub mod framvinda;
pub mod project;
pub mod rebar;
