pub mod config;
pub mod error;
pub mod slot_api_client;
pub mod slot_mapper;
pub mod slot_store;
pub mod storage;
