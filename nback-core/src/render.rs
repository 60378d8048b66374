/// Straight (non-premultiplied) RGBA.
pub type Rgba = [u8; 4];

pub const WHITE: Rgba = [255, 255, 255, 255];
pub const BLACK: Rgba = [0, 0, 0, 255];

/// Full-screen text display. Each call replaces whatever was shown before;
/// `text` may contain `\n` to stack several centred lines.
pub trait Renderer {
    fn render(&mut self, text: &str, color: Rgba) -> anyhow::Result<()>;
}
