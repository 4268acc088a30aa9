pub mod date_window;
pub mod models;
pub mod template;
pub mod time_labels;
