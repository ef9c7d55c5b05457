//! API Routes

pub mod camera;
