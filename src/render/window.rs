use anyhow::Result;
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use super::surface::{Canvas, Surface};
use crate::video::DisplayBox;

/// オーバーレイを表示する minifb ウィンドウ
pub struct OverlayWindow {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    background: u32,
}

impl OverlayWindow {
    /// ウィンドウを作成
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: true,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self {
            window,
            buffer: vec![0u32; width * height],
            width,
            height,
            background: 0x0020_2020,
        })
    }

    /// ウィンドウが開いているか
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    /// 現在の表示サイズ（リサイズされていれば変わる）
    pub fn display_box(&self) -> DisplayBox {
        let (w, h) = self.window.get_size();
        DisplayBox::new(w as u32, h as u32)
    }

    /// 押された瞬間のキー
    pub fn pressed_keys(&self) -> Vec<Key> {
        self.window.get_keys_pressed(KeyRepeat::No)
    }

    /// 背景にオーバーレイを重ねて表示
    pub fn present(&mut self, overlay: &Surface) -> Result<()> {
        let display = self.display_box();
        let (w, h) = (display.width as usize, display.height as usize);
        if w != self.width || h != self.height {
            self.width = w;
            self.height = h;
            self.buffer = vec![0u32; w * h];
        }

        self.buffer.fill(self.background);
        if overlay.width() as usize == self.width && overlay.height() as usize == self.height {
            overlay.composite_onto(&mut self.buffer);
        }

        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)?;
        Ok(())
    }
}
