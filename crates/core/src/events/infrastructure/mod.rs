pub mod background_uploader;
pub mod http_event_uploader;
