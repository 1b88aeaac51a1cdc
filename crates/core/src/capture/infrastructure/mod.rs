pub mod ffmpeg_stream_source;
pub mod image_file_loader;
pub mod image_file_persister;
