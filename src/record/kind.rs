use serde::Serialize;

/// What a record represents. Fixed for the lifetime of the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Onscreen,
    Offscreen,
    Texture,
    /// Carries drawing state and a rect, but no pixels.
    Proxy,
}

impl WindowKind {
    pub fn name(&self) -> &'static str {
        match self {
            WindowKind::Onscreen => "onscreen window",
            WindowKind::Offscreen => "offscreen window",
            WindowKind::Texture => "texture",
            WindowKind::Proxy => "proxy",
        }
    }

    /// Onscreen and offscreen windows. Those can be drawn into directly.
    pub fn is_window(&self) -> bool {
        matches!(self, WindowKind::Onscreen | WindowKind::Offscreen)
    }

    /// Kinds that carry pixels which can be used as a blit source.
    pub fn has_pixels(&self) -> bool {
        !matches!(self, WindowKind::Proxy)
    }
}

/// Selects records during enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindFilter {
    Any,
    Onscreen,
    Offscreen,
    /// Onscreen and offscreen windows.
    Windows,
    Textures,
    Proxies,
}

impl KindFilter {
    pub fn matches(&self, kind: WindowKind) -> bool {
        match self {
            KindFilter::Any => true,
            KindFilter::Onscreen => kind == WindowKind::Onscreen,
            KindFilter::Offscreen => kind == WindowKind::Offscreen,
            KindFilter::Windows => kind.is_window(),
            KindFilter::Textures => kind == WindowKind::Texture,
            KindFilter::Proxies => kind == WindowKind::Proxy,
        }
    }
}
