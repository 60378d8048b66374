use ab_glyph::{Font, FontArc, Glyph, PxScale, ScaleFont, point};
use anyhow::{Context, Result, ensure};
use bytemuck::{cast_slice, cast_slice_mut};
use nback_cache::{get_text, intern_text};
use nback_core::{BLACK, Renderer, Rgba};
use nback_timing::{FrameStats, HighPrecisionTimer, Timer};
use std::collections::HashMap;
use std::sync::Arc;
use tiny_skia::{Color, Pixmap, Rect};
use tracing::{debug, trace};

/// One premultiplied RGBA pixel as laid out in a `Pixmap`.
type Px = [u8; 4];

/// Rasterised lines keyed by (intern id, colour). `None` marks lines with no
/// visible glyphs so they are not laid out again.
struct TextCache {
    font: FontArc,
    size_px: f32,
    map: HashMap<(usize, Rgba), Option<Arc<Pixmap>>>,
}

impl TextCache {
    fn new(font: FontArc, size_px: f32) -> Self {
        Self {
            font,
            size_px,
            map: HashMap::new(),
        }
    }

    fn get_or_render(&mut self, line: &str, color: Rgba) -> Option<Arc<Pixmap>> {
        let id = intern_text(line);
        if let Some(p) = self.map.get(&(id, color)) {
            return p.clone();
        }
        let text = get_text(id)?;
        let pm = render_text_pixmap(&text, self.size_px, &self.font, color).map(Arc::new);
        trace!(id, line, "rasterised line");
        self.map.insert((id, color), pm.clone());
        pm
    }
}

/// Rasterises a single line into a tight, transparent, premultiplied pixmap.
/// Returns `None` when no glyph of `text` has an outline.
pub fn render_text_pixmap<F: Font>(
    text: &str,
    font_size: f32,
    font: &F,
    color: Rgba,
) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    // Layout with baseline at ascent
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let outlines: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();
    if outlines.is_empty() {
        return None;
    }

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for out in &outlines {
        let b = out.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;
    let stride = w as usize;
    let dst: &mut [Px] = cast_slice_mut(pm.data_mut());

    for out in &outlines {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i64;
            let iy = (y as f32 + b.min.y - min_y).floor() as i64;
            if ix < 0 || iy < 0 || ix >= w as i64 || iy >= h as i64 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            // Premultiply by coverage * alpha, then source-over.
            let a = (cov * color[3] as f32 / 255.0).clamp(0.0, 1.0);
            let src = [
                (color[0] as f32 * a) as u8,
                (color[1] as f32 * a) as u8,
                (color[2] as f32 * a) as u8,
                (a * 255.0) as u8,
            ];
            dst[i] = over(src, dst[i]);
        });
    }

    Some(pm)
}

/// Porter-Duff source-over in premultiplied space.
fn over(src: Px, dst: Px) -> Px {
    let inv = 255 - src[3] as u32;
    let mut out = [0u8; 4];
    for c in 0..4 {
        out[c] = (src[c] as u32 + (dst[c] as u32 * inv + 127) / 255).min(255) as u8;
    }
    out
}

/// Vertical centres for `count` stacked lines of `line_height`, centred as
/// a block on `center`.
pub fn line_centers(count: usize, center: (f32, f32), line_height: f32) -> Vec<(f32, f32)> {
    let top = center.1 - count as f32 * line_height * 0.5;
    (0..count)
        .map(|i| (center.0, top + (i as f32 + 0.5) * line_height))
        .collect()
}

/// Draws `src` centred on `pos`, clipped to the canvas. Returns the touched
/// region, or `None` when nothing landed on the canvas.
pub fn blit_centered(canvas: &mut Pixmap, src: &Pixmap, pos: (f32, f32)) -> Option<Rect> {
    let (w, h) = (src.width() as i64, src.height() as i64);
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);

    let x0 = (pos.0 - w as f32 * 0.5).floor() as i64;
    let y0 = (pos.1 - h as f32 * 0.5).floor() as i64;

    let dst_x = x0.max(0);
    let dst_y = y0.max(0);
    let dst_x_end = (x0 + w).min(cw);
    let dst_y_end = (y0 + h).min(ch);
    if dst_x_end <= dst_x || dst_y_end <= dst_y {
        return None;
    }

    let src_x = (dst_x - x0) as usize;
    let src_y = (dst_y - y0) as usize;
    let copy_w = (dst_x_end - dst_x) as usize;
    let copy_h = (dst_y_end - dst_y) as usize;
    let (dst_x, dst_y) = (dst_x as usize, dst_y as usize);

    let src_stride = src.width() as usize;
    let dst_stride = canvas.width() as usize;
    let src_px: &[Px] = cast_slice(src.data());
    let dst_px: &mut [Px] = cast_slice_mut(canvas.data_mut());

    let fully_opaque = (0..copy_h).all(|row| {
        let start = (src_y + row) * src_stride + src_x;
        src_px[start..start + copy_w].iter().all(|p| p[3] == 255)
    });

    for row in 0..copy_h {
        let s = (src_y + row) * src_stride + src_x;
        let d = (dst_y + row) * dst_stride + dst_x;
        let src_row = &src_px[s..s + copy_w];
        let dst_row = &mut dst_px[d..d + copy_w];
        if fully_opaque {
            dst_row.copy_from_slice(src_row);
        } else {
            for (dp, sp) in dst_row.iter_mut().zip(src_row) {
                *dp = over(*sp, *dp);
            }
        }
    }

    Rect::from_xywh(dst_x as f32, dst_y as f32, copy_w as f32, copy_h as f32)
}

/// Centred text on a solid background, drawn offscreen with tiny-skia.
/// The caller copies the finished canvas into its frame buffer.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    center: (f32, f32),
    background: Rgba,
    canvas: Pixmap,
    text_cache: TextCache,
    line_height: f32,
    draw_timer: HighPrecisionTimer,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32, font: FontArc, font_size: f32) -> Result<Self> {
        let sf = font.as_scaled(PxScale::from(font_size));
        let line_height = sf.height() + sf.line_gap();
        let canvas = blank_canvas(width, height, BLACK)?;
        Ok(Self {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            background: BLACK,
            canvas,
            text_cache: TextCache::new(font, font_size),
            line_height,
            draw_timer: HighPrecisionTimer::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.canvas = blank_canvas(width, height, self.background)?;
        self.width = width;
        self.height = height;
        self.center = (width as f32 / 2.0, height as f32 / 2.0);
        debug!(width, height, "canvas resized");
        Ok(())
    }

    /// Replaces the canvas contents with `text`, one centred row per line.
    pub fn draw_text(&mut self, text: &str, color: Rgba) -> Result<()> {
        let start = self.draw_timer.now();
        self.canvas.fill(to_color(self.background));

        let lines: Vec<&str> = text.lines().collect();
        let centers = line_centers(lines.len(), self.center, self.line_height);
        for (line, pos) in lines.into_iter().zip(centers) {
            if let Some(pm) = self.text_cache.get_or_render(line, color) {
                blit_centered(&mut self.canvas, &pm, pos);
            }
        }

        let elapsed = self.draw_timer.elapsed(start);
        self.draw_timer.record_frame(elapsed);
        Ok(())
    }

    /// Copies the canvas into an RGBA8 frame of the same size. The canvas is
    /// opaque, so premultiplied and straight alpha coincide.
    pub fn copy_to(&self, frame: &mut [u8]) -> Result<()> {
        let data = self.canvas.data();
        ensure!(
            frame.len() == data.len(),
            "frame holds {} bytes, canvas {}x{} needs {}",
            frame.len(),
            self.width,
            self.height,
            data.len()
        );
        frame.copy_from_slice(data);
        Ok(())
    }

    pub fn draw_stats(&self) -> FrameStats {
        self.draw_timer.frame_stats()
    }
}

impl Renderer for SkiaRenderer {
    fn render(&mut self, text: &str, color: Rgba) -> Result<()> {
        self.draw_text(text, color)
    }
}

fn to_color(c: Rgba) -> Color {
    Color::from_rgba8(c[0], c[1], c[2], c[3])
}

fn blank_canvas(width: u32, height: u32, background: Rgba) -> Result<Pixmap> {
    let mut canvas = Pixmap::new(width, height)
        .with_context(|| format!("cannot allocate a {width}x{height} canvas"))?;
    canvas.fill(to_color(background));
    Ok(canvas)
}
