/// A batch of images kept on the host as `[n, c, h, w]` floats in `[0, 1]`.
///
/// Workers return their generated samples as `ImageSet`s so that gathering,
/// grid rendering and scoring never depend on which device produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSet {
    pub data:     Vec<f32>,
    pub count:    usize,
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
}

impl ImageSet {
    pub fn new(data: Vec<f32>, count: usize, channels: usize, height: usize, width: usize) -> Self {
        debug_assert_eq!(data.len(), count * channels * height * width);
        Self { data, count, channels, height, width }
    }

    pub fn empty(channels: usize, height: usize, width: usize) -> Self {
        Self::new(Vec::new(), 0, channels, height, width)
    }

    /// Number of floats in one image.
    pub fn image_len(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn image(&self, index: usize) -> &[f32] {
        let len = self.image_len();
        &self.data[index * len..(index + 1) * len]
    }

    /// Concatenate per-worker sets in rank order.
    pub fn concat(parts: Vec<ImageSet>) -> Option<ImageSet> {
        let mut iter = parts.into_iter();
        let mut out  = iter.next()?;
        for part in iter {
            if part.image_len() != out.image_len() {
                return None;
            }
            out.data.extend(part.data);
            out.count += part.count;
        }
        Some(out)
    }

    /// Keep only the first `n` images.
    pub fn truncate(&mut self, n: usize) {
        if n < self.count {
            let len = self.image_len();
            self.data.truncate(n * len);
            self.count = n;
        }
    }
}
