use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pose::Region;

/// ARGB 色 (0xAARRGGBB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub u32);

impl Color {
    pub const TRANSPARENT: Color = Color(0);

    /// 不透明な RGB 色
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color(0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    /// "#RRGGBB" または "#AARRGGBB" を解釈
    pub fn from_hex(s: &str) -> Result<Self, String> {
        let hex = s.trim().trim_start_matches('#');
        let value = u32::from_str_radix(hex, 16).map_err(|_| format!("invalid color: {s}"))?;
        match hex.len() {
            6 => Ok(Color(0xFF00_0000 | value)),
            8 => Ok(Color(value)),
            _ => Err(format!("invalid color: {s}")),
        }
    }

    pub fn to_hex(self) -> String {
        if self.alpha() == 0xFF {
            format!("#{:06X}", self.0 & 0x00FF_FFFF)
        } else {
            format!("#{:08X}", self.0)
        }
    }

    pub fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// (r, g, b, a)
    pub fn channels(self) -> [u8; 4] {
        [
            (self.0 >> 16) as u8,
            (self.0 >> 8) as u8,
            self.0 as u8,
            self.alpha(),
        ]
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// オーバーレイの表示オプション
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizationOptions {
    /// キーポイントの円の半径 (px)
    pub joint_radius: f32,
    pub joint_color: Color,
    pub connector_color: Color,
    /// 骨格線の太さ (px)
    pub connector_width: f32,
    /// オーバーレイ全体の表示
    pub enabled: bool,
    regions: BTreeMap<Region, bool>,
}

impl Default for VisualizationOptions {
    fn default() -> Self {
        Self {
            joint_radius: 4.0,
            joint_color: Color::rgb(0x00, 0xFF, 0x00),
            connector_color: Color::rgb(0xFF, 0xFF, 0x00),
            connector_width: 2.0,
            enabled: true,
            regions: Region::ALL.iter().map(|r| (*r, true)).collect(),
        }
    }
}

/// 表示オプションへの1回分の変更
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionChange {
    JointRadius(f32),
    JointColor(Color),
    Connector { color: Color, width: f32 },
    ConnectorWidth(f32),
    ToggleRegion(Region),
    RegionVisible(Region, bool),
    Enabled(bool),
}

impl VisualizationOptions {
    pub fn is_region_visible(&self, region: Region) -> bool {
        self.regions.get(&region).copied().unwrap_or(true)
    }

    pub fn set_region_visible(&mut self, region: Region, visible: bool) {
        self.regions.insert(region, visible);
    }

    /// 部位の表示を反転し、新しい状態を返す
    pub fn toggle_region(&mut self, region: Region) -> bool {
        let visible = !self.is_region_visible(region);
        self.set_region_visible(region, visible);
        visible
    }

    /// インデックスのキーポイントが部位設定上表示対象か
    pub fn is_joint_shown(&self, index: usize) -> bool {
        self.is_region_visible(Region::of(index))
    }

    pub fn apply(&mut self, change: OptionChange) {
        match change {
            OptionChange::JointRadius(radius) => self.joint_radius = radius.max(0.0),
            OptionChange::JointColor(color) => self.joint_color = color,
            OptionChange::Connector { color, width } => {
                self.connector_color = color;
                self.connector_width = width.max(0.0);
            }
            OptionChange::ConnectorWidth(width) => self.connector_width = width.max(0.0),
            OptionChange::ToggleRegion(region) => {
                self.toggle_region(region);
            }
            OptionChange::RegionVisible(region, visible) => self.set_region_visible(region, visible),
            OptionChange::Enabled(enabled) => self.enabled = enabled,
        }
    }
}
