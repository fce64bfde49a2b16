pub mod user_repo;
pub use user_repo::UserRepository;
pub mod project_repo;
pub use project_repo::ProjectRepository;
pub mod element_repo;
pub use element_repo::ElementRepository;
pub mod rebar_repo;
pub use rebar_repo::RebarRepository;
pub mod delivery_repo;
pub use delivery_repo::DeliveryRepository;
pub mod framvinda_repo;
pub use framvinda_repo::FramvindaRepository;

#[cfg(test)]
pub(crate) mod fixtures;
