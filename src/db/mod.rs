pub mod admin_repository;
pub mod integrity;
pub mod memory_store;
pub mod postgres_admin_repository;
pub mod postgres_token_repository;
pub mod postgres_user_repository;
pub mod token_repository;
pub mod user_repository;
