use super::{BuilderBase, EntityBuilder, required, wrong_kind};
use crate::entity::{DrawingDirection, Entity, HAlign, Shape, Text, VAlign};
use crate::errors::CadError;
use crate::geometry::Coordinate;

/// 未指定文字样式时使用的样式名。
pub const DEFAULT_TEXT_STYLE: &str = "Standard";

#[derive(Debug, Clone)]
pub struct TextBuilder {
    base: BuilderBase,
    insertion_point: Option<Coordinate>,
    text_value: Option<String>,
    height: Option<f64>,
    angle: f64,
    style: String,
    drawing_direction: DrawingDirection,
    halign: HAlign,
    valign: VAlign,
    underlined: bool,
    strikethrough: bool,
    bold: bool,
    italic: bool,
}

impl Default for TextBuilder {
    fn default() -> Self {
        Self {
            base: BuilderBase::default(),
            insertion_point: None,
            text_value: None,
            height: None,
            angle: 0.0,
            style: DEFAULT_TEXT_STYLE.to_string(),
            drawing_direction: DrawingDirection::default(),
            halign: HAlign::default(),
            valign: VAlign::default(),
            underlined: false,
            strikethrough: false,
            bold: false,
            italic: false,
        }
    }
}

impl TextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entity(entity: &Entity) -> Result<Self, CadError> {
        match entity.shape() {
            Shape::Text(text) => Ok(Self {
                base: BuilderBase::from_entity(entity),
                insertion_point: Some(text.insertion_point),
                text_value: Some(text.text_value.clone()),
                height: Some(text.height),
                angle: text.angle,
                style: text.style.clone(),
                drawing_direction: text.drawing_direction,
                halign: text.halign,
                valign: text.valign,
                underlined: text.underlined,
                strikethrough: text.strikethrough,
                bold: text.bold,
                italic: text.italic,
            }),
            _ => Err(wrong_kind("text", entity)),
        }
    }

    pub fn set_insertion_point(mut self, point: Coordinate) -> Self {
        self.insertion_point = Some(point);
        self
    }

    pub fn set_text_value(mut self, value: impl Into<String>) -> Self {
        self.text_value = Some(value.into());
        self
    }

    pub fn set_height(mut self, height: f64) -> Self {
        self.height = Some(height);
        self
    }

    pub fn set_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    pub fn set_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn set_drawing_direction(mut self, direction: DrawingDirection) -> Self {
        self.drawing_direction = direction;
        self
    }

    pub fn set_halign(mut self, halign: HAlign) -> Self {
        self.halign = halign;
        self
    }

    pub fn set_valign(mut self, valign: VAlign) -> Self {
        self.valign = valign;
        self
    }

    pub fn set_underlined(mut self, value: bool) -> Self {
        self.underlined = value;
        self
    }

    pub fn set_strikethrough(mut self, value: bool) -> Self {
        self.strikethrough = value;
        self
    }

    pub fn set_bold(mut self, value: bool) -> Self {
        self.bold = value;
        self
    }

    pub fn set_italic(mut self, value: bool) -> Self {
        self.italic = value;
        self
    }
}

impl EntityBuilder for TextBuilder {
    fn base(&self) -> &BuilderBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BuilderBase {
        &mut self.base
    }

    fn build(&self) -> Result<Entity, CadError> {
        let insertion_point = required(self.insertion_point, "insertion_point")?;
        let text_value = self
            .text_value
            .clone()
            .ok_or(CadError::MissingField("text_value"))?;
        let height = required(self.height, "height")?;
        self.base.finish(Shape::Text(Text {
            insertion_point,
            text_value,
            height,
            angle: self.angle,
            style: self.style.clone(),
            drawing_direction: self.drawing_direction,
            halign: self.halign,
            valign: self.valign,
            underlined: self.underlined,
            strikethrough: self.strikethrough,
            bold: self.bold,
            italic: self.italic,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello() -> TextBuilder {
        TextBuilder::new()
            .set_layer("0")
            .set_insertion_point(Coordinate::new(1.0, 1.0))
            .set_text_value("hello")
    }

    #[test]
    fn height_is_required_and_positive() {
        assert_eq!(hello().build().unwrap_err(), CadError::MissingField("height"));
        assert!(matches!(
            hello().set_height(0.0).build(),
            Err(CadError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn defaults_apply_to_unset_fields() {
        let text = hello().set_height(2.0).build().unwrap();
        let Shape::Text(shape) = text.shape() else {
            panic!("expected text");
        };
        assert_eq!(shape.style, DEFAULT_TEXT_STYLE);
        assert_eq!(shape.halign, HAlign::Left);
        assert_eq!(shape.valign, VAlign::Baseline);
        assert!(!shape.bold && !shape.italic);
    }

    #[test]
    fn cjk_text_is_measured_wider() {
        let latin = hello().set_height(1.0).build().unwrap().bounding_box();
        let cjk = hello()
            .set_text_value("你好世界啊")
            .set_height(1.0)
            .build()
            .unwrap()
            .bounding_box();
        assert!((latin.width() - 3.0).abs() < 1e-9);
        assert!((cjk.width() - 5.0).abs() < 1e-9);
    }
}
