mod render;
mod transform;

pub use render::{active_camera, extract_draw_list, DrawCommand, DrawList};
pub use transform::propagate_transforms;
