use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// One 8-bit image in channel-major (CHW) order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageItem {
    pub pixels:   Vec<u8>,
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
}

impl ImageItem {
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

pub struct ImageDataset {
    items: Vec<ImageItem>,
}

impl ImageDataset {
    pub fn new(items: Vec<ImageItem>) -> Self { Self { items } }

    /// `[c, h, w]` of the first image, if any.
    pub fn image_shape(&self) -> Option<[usize; 3]> {
        self.items.first().map(ImageItem::shape)
    }
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
