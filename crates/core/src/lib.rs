pub mod capture;
pub mod detection;
pub mod events;
pub mod pipeline;
pub mod recognition;
pub mod shared;
