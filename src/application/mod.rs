pub mod bootstrap;
pub mod commands;
pub mod schedule_service;
pub mod slot_editor;
