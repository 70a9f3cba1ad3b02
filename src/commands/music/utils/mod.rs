// Export music utilities
pub mod event_handlers;
pub mod music_manager;
pub mod presence_monitor;
pub mod voice_gateway;
