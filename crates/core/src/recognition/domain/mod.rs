pub mod face_embedder;
pub mod face_gallery;
pub mod face_matcher;
