pub mod arcface_embedder;
pub mod embedding_face_matcher;
