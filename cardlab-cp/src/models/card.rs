//! Card pair input model.

/// A front+back image set representing one physical card.
///
/// Both sides must be present before processing begins; a missing side is a
/// fatal per-pair error, never a fatal batch error.
#[derive(Debug, Clone, Default)]
pub struct CardPair {
    pub front_image: Option<Vec<u8>>,
    pub back_image: Option<Vec<u8>>,
}

impl CardPair {
    pub fn new(front_image: Option<Vec<u8>>, back_image: Option<Vec<u8>>) -> Self {
        Self { front_image, back_image }
    }

    /// A side counts as present only when it holds actual bytes.
    pub fn front(&self) -> Option<&[u8]> {
        self.front_image.as_deref().filter(|b| !b.is_empty())
    }

    pub fn back(&self) -> Option<&[u8]> {
        self.back_image.as_deref().filter(|b| !b.is_empty())
    }
}
