pub mod configuration;
pub mod errors;
pub mod formats;
pub mod logging;
pub mod models;
pub mod projection;
pub mod providers;
pub mod sliding_window;
pub mod stream;
pub mod token_counter;
pub mod tool_router;
