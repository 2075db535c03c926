//! Latest-image selection.
//!
//! Images are grouped by drive letter and the newest snapshot of each group
//! is kept. When two images of the same drive share a snapshot time, the one
//! with the lexically smallest uuid wins, so the choice never depends on the
//! order the appliance listed them in.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::appliance::{Image, SnapshotTime};

/// The image selected for one volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestImage {
    /// Image identifier
    pub uuid: String,
    /// Image file path on the appliance
    pub path: String,
    /// Snapshot time of the selected image
    pub snapshot_time: SnapshotTime,
}

impl LatestImage {
    fn from_image(image: &Image) -> Self {
        Self {
            uuid: image.uuid.clone(),
            path: image.filename.clone(),
            snapshot_time: image.snapshot_time,
        }
    }

    /// Whether `image` should replace this selection.
    fn is_superseded_by(&self, image: &Image) -> bool {
        image.snapshot_time > self.snapshot_time
            || (image.snapshot_time == self.snapshot_time && image.uuid < self.uuid)
    }
}

/// Select the newest image for every drive letter.
///
/// The returned map is ordered by drive letter, which is also the order the
/// volumes are restored in.
///
/// # Example
///
/// ```
/// use spx_restore::appliance::Image;
/// use spx_restore::restore::latest_images;
///
/// let images = vec![
///     Image::new("a", "C:", "C_VOL-b001.spf", 100),
///     Image::new("b", "C:", "C_VOL-b001-i002.spi", 200),
///     Image::new("c", "D:", "D_VOL-b001.spf", 150),
/// ];
///
/// let latest = latest_images(&images);
/// assert_eq!(latest.len(), 2);
/// assert_eq!(latest["C:"].uuid, "b");
/// assert_eq!(latest["D:"].path, "D_VOL-b001.spf");
/// ```
#[must_use]
pub fn latest_images(images: &[Image]) -> BTreeMap<String, LatestImage> {
    let mut latest: BTreeMap<String, LatestImage> = BTreeMap::new();

    for image in images {
        match latest.get_mut(&image.drive_letter) {
            Some(current) => {
                if current.is_superseded_by(image) {
                    *current = LatestImage::from_image(image);
                }
            }
            None => {
                latest.insert(image.drive_letter.clone(), LatestImage::from_image(image));
            }
        }
    }

    latest
}
