use std::sync::Arc;

use super::options::Color;

/// オーバーレイを描く2Dキャンバス
pub trait Canvas {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// 矩形領域を透明にする
    fn clear_rect(&mut self, x: u32, y: u32, width: u32, height: u32);

    fn clear(&mut self) {
        let (w, h) = (self.width(), self.height());
        self.clear_rect(0, 0, w, h);
    }

    /// 塗りつぶした円
    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Color);

    /// 太さ付きの線分
    fn draw_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, width: f32, color: Color);

    /// 現在のピクセルを保存
    fn snapshot(&self) -> Snapshot;

    /// 保存したピクセルを書き戻す（サイズが違えば false）
    fn restore(&mut self, snapshot: &Snapshot) -> bool;
}

/// キャンバスのピクセルの写し
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    width: u32,
    height: u32,
    pixels: Arc<[u32]>,
}

impl Snapshot {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// 同じバッファを共有しているか
    pub fn ptr_eq(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

/// ARGB ピクセルバッファ（0 = 透明）
#[derive(Debug, Clone)]
pub struct Surface {
    buffer: Vec<u32>,
    width: u32,
    height: u32,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buffer: vec![0u32; width as usize * height as usize],
            width,
            height,
        }
    }

    /// サイズを変更して透明にする
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.buffer.clear();
        self.buffer.resize(width as usize * height as usize, 0);
    }

    /// 幅か高さが0
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn buffer(&self) -> &[u32] {
        &self.buffer
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x < self.width && y < self.height {
            Some(Color(self.buffer[y as usize * self.width as usize + x as usize]))
        } else {
            None
        }
    }

    /// 何か描かれているか
    pub fn is_blank(&self) -> bool {
        self.buffer.iter().all(|&p| p == 0)
    }

    /// RGBA 画像に変換
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        let mut img = image::RgbaImage::new(self.width, self.height);
        for (dst, &src) in img.pixels_mut().zip(self.buffer.iter()) {
            *dst = image::Rgba(Color(src).channels());
        }
        img
    }

    /// 背景の 0RGB バッファにアルファ合成する
    pub fn composite_onto(&self, background: &mut [u32]) {
        for (dst, &src) in background.iter_mut().zip(self.buffer.iter()) {
            let alpha = src >> 24;
            if alpha == 0 {
                continue;
            }
            if alpha == 0xFF {
                *dst = src & 0x00FF_FFFF;
                continue;
            }
            let blend = |shift: u32| -> u32 {
                let s = (src >> shift) & 0xFF;
                let d = (*dst >> shift) & 0xFF;
                ((s * alpha + d * (255 - alpha)) / 255) << shift
            };
            *dst = blend(16) | blend(8) | blend(0);
        }
    }

    /// ピクセルをセット（境界チェック付き）
    fn set_pixel(&mut self, x: i32, y: i32, color: Color) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width as usize + x as usize] = color.0;
        }
    }

    /// 整数座標の塗りつぶし円
    fn stamp_disc(&mut self, cx: i32, cy: i32, radius: i32, color: Color) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }
}

/// 太さ `width` の線に押す円の半径（描いた線が `width` を超えない）
fn line_half_width(width: f32) -> i32 {
    ((width - 1.0) / 2.0).floor().max(0.0) as i32
}

impl Canvas for Surface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear_rect(&mut self, x: u32, y: u32, width: u32, height: u32) {
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        for row in y.min(y_end)..y_end {
            let start = row as usize * self.width as usize;
            self.buffer[start + x.min(x_end) as usize..start + x_end as usize].fill(0);
        }
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Color) {
        self.stamp_disc(cx as i32, cy as i32, radius.round() as i32, color);
    }

    /// Bresenhamのアルゴリズムで線を描画し、太さの分だけ円を押す
    ///
    /// 円の直径は 2 * half + 1 px なので、偶数の太さは1つ細い奇数に切り下げる。
    fn draw_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, width: f32, color: Color) {
        let (x0, y0, x1, y1) = (x0 as i32, y0 as i32, x1 as i32, y1 as i32);
        let half = line_half_width(width);

        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            if half == 0 {
                self.set_pixel(x, y, color);
            } else {
                self.stamp_disc(x, y, half, color);
            }

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            width: self.width,
            height: self.height,
            pixels: self.buffer.as_slice().into(),
        }
    }

    fn restore(&mut self, snapshot: &Snapshot) -> bool {
        if snapshot.width != self.width || snapshot.height != self.height {
            return false;
        }
        self.buffer.copy_from_slice(&snapshot.pixels);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::rgb(0xFF, 0, 0);

    #[test]
    fn test_new_surface_is_blank() {
        let s = Surface::new(8, 4);
        assert_eq!(s.buffer().len(), 32);
        assert!(s.is_blank());
    }

    #[test]
    fn test_fill_circle() {
        let mut s = Surface::new(20, 20);
        s.fill_circle(10.0, 10.0, 3.0, RED);
        assert_eq!(s.pixel(10, 10), Some(RED));
        assert_eq!(s.pixel(13, 10), Some(RED));
        assert_eq!(s.pixel(14, 10), Some(Color::TRANSPARENT));
        assert_eq!(s.pixel(12, 12), Some(RED));
        assert_eq!(s.pixel(13, 13), Some(Color::TRANSPARENT));
    }

    #[test]
    fn test_circle_clipped_at_border() {
        let mut s = Surface::new(4, 4);
        s.fill_circle(0.0, 0.0, 5.0, RED);
        assert_eq!(s.pixel(3, 3), Some(RED));
        assert_eq!(s.pixel(4, 4), None);
    }

    #[test]
    fn test_draw_line_endpoints() {
        let mut s = Surface::new(10, 10);
        s.draw_line(1.0, 1.0, 8.0, 5.0, 1.0, RED);
        assert_eq!(s.pixel(1, 1), Some(RED));
        assert_eq!(s.pixel(8, 5), Some(RED));
        assert_eq!(s.pixel(1, 8), Some(Color::TRANSPARENT));
    }

    #[test]
    fn test_thick_line_covers_neighbours() {
        let mut s = Surface::new(10, 10);
        s.draw_line(0.0, 5.0, 9.0, 5.0, 3.0, RED);
        assert_eq!(s.pixel(4, 4), Some(RED));
        assert_eq!(s.pixel(4, 6), Some(RED));
        assert_eq!(s.pixel(4, 8), Some(Color::TRANSPARENT));
    }

    #[test]
    fn test_line_never_wider_than_requested() {
        assert_eq!(line_half_width(1.0), 0);
        assert_eq!(line_half_width(2.0), 0);
        assert_eq!(line_half_width(3.0), 1);
        assert_eq!(line_half_width(4.0), 1);
        assert_eq!(line_half_width(5.0), 2);
        assert_eq!(line_half_width(0.0), 0);

        let mut s = Surface::new(10, 10);
        s.draw_line(0.0, 5.0, 9.0, 5.0, 2.0, RED);
        assert_eq!(s.pixel(4, 5), Some(RED));
        assert_eq!(s.pixel(4, 4), Some(Color::TRANSPARENT));
        assert_eq!(s.pixel(4, 6), Some(Color::TRANSPARENT));
    }

    #[test]
    fn test_clear_rect() {
        let mut s = Surface::new(6, 6);
        s.fill_circle(3.0, 3.0, 3.0, RED);
        s.clear_rect(0, 0, 6, 3);
        assert_eq!(s.pixel(3, 1), Some(Color::TRANSPARENT));
        assert_eq!(s.pixel(3, 4), Some(RED));
        s.clear_rect(4, 4, 100, 100);
        assert_eq!(s.pixel(5, 4), Some(Color::TRANSPARENT));
        s.clear();
        assert!(s.is_blank());
    }

    #[test]
    fn test_snapshot_restore() {
        let mut s = Surface::new(5, 5);
        s.fill_circle(2.0, 2.0, 1.0, RED);
        let snap = s.snapshot();
        s.clear();
        assert!(s.restore(&snap));
        assert_eq!(s.pixel(2, 2), Some(RED));
        assert_eq!(s.buffer(), snap.pixels());

        s.resize(6, 5);
        assert!(!s.restore(&snap));
        assert!(s.is_blank());
    }

    #[test]
    fn test_composite_onto() {
        let mut s = Surface::new(2, 1);
        s.set_pixel(0, 0, RED);
        let mut bg = vec![0x0000_00FF, 0x0000_00FF];
        s.composite_onto(&mut bg);
        assert_eq!(bg, vec![0x00FF_0000, 0x0000_00FF]);

        let mut half = Surface::new(1, 1);
        half.set_pixel(0, 0, Color(0x80FF_FFFF));
        let mut bg = vec![0u32];
        half.composite_onto(&mut bg);
        assert_eq!(bg[0], 0x0080_8080);
    }

    #[test]
    fn test_to_rgba_image() {
        let mut s = Surface::new(2, 2);
        s.set_pixel(1, 0, Color::rgb(1, 2, 3));
        let img = s.to_rgba_image();
        assert_eq!(img.get_pixel(1, 0).0, [1, 2, 3, 255]);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }
}
