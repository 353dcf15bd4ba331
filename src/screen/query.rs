use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, ScreenError};
use crate::registry::Handle;
use crate::render::color::ColorRange;
use crate::screen::Screen;

/// A property of a record that [`Screen::query`] can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryField {
    Rect,
    Kind,
    Depth,
    Channels,
    Bpc,
    Multisample,
    Backend,
    Caps,
    Parent,
    Root,
    TextureId,
    FboCount,
    StereoDrawBuffer,
    ColorRange,
}

impl QueryField {
    pub const ALL: [QueryField; 14] = [
        QueryField::Rect,
        QueryField::Kind,
        QueryField::Depth,
        QueryField::Channels,
        QueryField::Bpc,
        QueryField::Multisample,
        QueryField::Backend,
        QueryField::Caps,
        QueryField::Parent,
        QueryField::Root,
        QueryField::TextureId,
        QueryField::FboCount,
        QueryField::StereoDrawBuffer,
        QueryField::ColorRange,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            QueryField::Rect => "rect",
            QueryField::Kind => "kind",
            QueryField::Depth => "depth",
            QueryField::Channels => "channels",
            QueryField::Bpc => "bpc",
            QueryField::Multisample => "multisample",
            QueryField::Backend => "backend",
            QueryField::Caps => "caps",
            QueryField::Parent => "parent",
            QueryField::Root => "root",
            QueryField::TextureId => "textureId",
            QueryField::FboCount => "fboCount",
            QueryField::StereoDrawBuffer => "stereoDrawBuffer",
            QueryField::ColorRange => "colorRange",
        }
    }
}

impl FromStr for QueryField {
    type Err = ScreenError;

    fn from_str(s: &str) -> Result<Self> {
        QueryField::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ScreenError::invalid_argument("field", format!("unknown query field '{s}'")))
    }
}

/// Answer to a query, serialized without a tag.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    /// left, top, right, bottom
    Rect([f64; 4]),
    Int(i64),
    Text(String),
    Flags(Vec<&'static str>),
    /// Raw handle value, `null` when there is none.
    Handle(Option<u64>),
    ColorRange(ColorRange),
}

impl Screen {
    pub fn query(&self, handle: Handle, field: QueryField) -> Result<QueryValue> {
        let record = self.registry.lookup(handle)?;
        Ok(match field {
            QueryField::Rect => {
                let r = record.rect;
                QueryValue::Rect([r.left, r.top, r.right, r.bottom])
            }
            QueryField::Kind => QueryValue::Text(record.kind().name().to_string()),
            QueryField::Depth => QueryValue::Int(record.depth as i64),
            QueryField::Channels => QueryValue::Int(record.channels as i64),
            QueryField::Bpc => QueryValue::Int(record.bpc as i64),
            QueryField::Multisample => QueryValue::Int(record.multisample as i64),
            QueryField::Backend => QueryValue::Text(record.backend.to_string()),
            QueryField::Caps => QueryValue::Flags(record.caps.names()),
            QueryField::Parent => QueryValue::Handle(
                record
                    .parent
                    .filter(|p| self.registry.contains(*p))
                    .map(|p| p.to_raw()),
            ),
            QueryField::Root => QueryValue::Handle(Some(record.resolve_root(&self.registry).to_raw())),
            QueryField::TextureId => QueryValue::Int(record.store.texture_id().map_or(0, |t| t.0 as i64)),
            QueryField::FboCount => QueryValue::Int(record.fbos.len() as i64),
            QueryField::StereoDrawBuffer => QueryValue::Text(format!("{:?}", record.stereo_draw_buffer).to_lowercase()),
            QueryField::ColorRange => QueryValue::ColorRange(record.color_range),
        })
    }

    /// Every field of a record, keyed by field name.
    pub fn query_all(&self, handle: Handle) -> Result<BTreeMap<&'static str, QueryValue>> {
        QueryField::ALL
            .into_iter()
            .map(|field| Ok((field.name(), self.query(handle, field)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::pixels::PixelBuffer;
    use crate::screen::tests::{classic, software_screen};

    #[test]
    fn field_names_parse_case_insensitively() {
        assert_eq!("textureid".parse::<QueryField>().unwrap(), QueryField::TextureId);
        assert_eq!("FboCount".parse::<QueryField>().unwrap(), QueryField::FboCount);
        assert!(matches!(
            "size".parse::<QueryField>(),
            Err(ScreenError::InvalidArgument { name: "field", .. })
        ));
        for field in QueryField::ALL {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.name()));
        }
    }

    #[test]
    fn texture_reports_parent_and_root() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(64, 48)).unwrap();
        let off = screen.open_offscreen(win, Rect::from_size(32.0, 32.0), 32).unwrap();
        let tex = screen.make_texture(off, PixelBuffer::solid(4, 2, [0; 4])).unwrap();

        assert_eq!(screen.query(tex, QueryField::Rect).unwrap(), QueryValue::Rect([0.0, 0.0, 4.0, 2.0]));
        assert_eq!(screen.query(tex, QueryField::Kind).unwrap(), QueryValue::Text("texture".into()));
        assert_eq!(screen.query(tex, QueryField::Parent).unwrap(), QueryValue::Handle(Some(off.to_raw())));
        assert_eq!(screen.query(tex, QueryField::Root).unwrap(), QueryValue::Handle(Some(win.to_raw())));
        assert_eq!(screen.query(tex, QueryField::TextureId).unwrap(), QueryValue::Int(0));
        assert_eq!(screen.query(off, QueryField::FboCount).unwrap(), QueryValue::Int(1));
        assert_eq!(screen.query(win, QueryField::Backend).unwrap(), QueryValue::Text("classic".into()));
    }

    #[test]
    fn answers_serialize_as_plain_json() {
        let mut screen = software_screen();
        let win = screen.open_window(classic(8, 8)).unwrap();
        let all = screen.query_all(win).unwrap();
        assert_eq!(all.len(), QueryField::ALL.len());

        let json = serde_json::to_value(&all).unwrap();
        assert_eq!(json["rect"], serde_json::json!([0.0, 0.0, 8.0, 8.0]));
        assert_eq!(json["parent"], serde_json::Value::Null);
        assert_eq!(json["colorRange"]["max"], serde_json::json!(1.0));
        assert!(json["caps"].as_array().unwrap().contains(&serde_json::json!("fbo")));
    }
}
