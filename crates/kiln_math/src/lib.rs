// Re-export glam for convenience
pub use glam::*;

// Kiln math types
mod transform;
pub use transform::{compose, ElementaryOp, Mat4Ext};
