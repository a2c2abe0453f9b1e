pub mod blob_store;
pub mod edit_client;
pub mod fusion_service;
pub mod model_client;
pub mod proxy;
pub mod task_error;
