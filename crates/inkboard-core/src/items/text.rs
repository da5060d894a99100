//! Text item.

use super::Stroke;
use serde::{Deserialize, Serialize};

/// Horizontal alignment of text within the item rect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TextAlign {
    #[default]
    Left = 0,
    Center = 1,
    Right = 2,
}

impl TryFrom<u8> for TextAlign {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(TextAlign::Left),
            1 => Ok(TextAlign::Center),
            2 => Ok(TextAlign::Right),
            other => Err(other),
        }
    }
}

/// A text block laid out inside the item rect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    /// Only the color is used when drawing; the weight is carried along.
    pub stroke: Stroke,
    pub font_size: f32,
    #[serde(default)]
    pub alignment: TextAlign,
    pub text: String,
}

impl TextItem {
    /// Lines of the text, as drawn top to bottom.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }
}
