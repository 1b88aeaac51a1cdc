pub mod frame_persister;
pub mod frame_source;
