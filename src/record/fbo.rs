use hashbrown::HashMap;
use serde::Serialize;

use crate::render::backend::{FramebufferId, TextureId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FboRole {
    LeftEye,
    RightEye,
    /// Scratch target for copies of a window onto itself.
    Bounce,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FboDescriptor {
    pub fbo: FramebufferId,
    pub color: TextureId,
    /// Whether the color attachment is owned by the FBO, or borrowed from the record's texture.
    pub owns_color: bool,
    pub width: u32,
    pub height: u32,
    pub multisample: u32,
}

/// Framebuffer objects of one record, keyed by their role.
#[derive(Clone, Debug, Default)]
pub struct FboTable {
    entries: HashMap<FboRole, FboDescriptor>,
}

impl FboTable {
    pub fn get(&self, role: FboRole) -> Option<&FboDescriptor> {
        self.entries.get(&role)
    }

    pub fn insert(&mut self, role: FboRole, desc: FboDescriptor) -> Option<FboDescriptor> {
        self.entries.insert(role, desc)
    }

    pub fn contains(&self, role: FboRole) -> bool {
        self.entries.contains_key(&role)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes all entries, in role order.
    pub fn drain_sorted(&mut self) -> Vec<(FboRole, FboDescriptor)> {
        let mut all: Vec<_> = self.entries.drain().collect();
        all.sort_by_key(|(role, _)| *role);
        all
    }
}
