pub mod fusion_handlers;
pub mod health_handlers;
