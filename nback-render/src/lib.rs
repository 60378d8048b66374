mod render;

pub use render::{SkiaRenderer, blit_centered, line_centers, render_text_pixmap};
