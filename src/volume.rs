use std::fmt;
use std::sync::Arc;

use crate::enums::Interpolation;
use crate::enums::Orientation;
use crate::identity::VolumeIdentity;
use crate::interpolator::Interpolator;

use image::ImageBuffer;
use image::Luma;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::s;
use rayon::prelude::*;

pub type SliceImage = ImageBuffer<Luma<u8>, Vec<u8>>;

/// Loaded volumetric dataset, `(depth, height, width)` voxels plus spacing.
#[derive(Default)]
pub struct Volume {
    pub data: Array3<u16>,
    pub spacing: (f32, f32, f32),
    pub interpolated_dim: (u32, u32, u32),
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("dim", &self.dim())
            .field("spacing", &self.spacing)
            .finish()
    }
}

impl Volume {
    pub fn new(data: Array3<u16>, spacing: (f32, f32, f32)) -> Self {
        let original_dim = data.dim();
        Self {
            data,
            spacing,
            interpolated_dim: Interpolator::get_isotropic_dimensions(spacing, original_dim),
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<u16> {
        &self.data
    }

    /// Number of slices available along `orientation`.
    pub fn slice_count(&self, orientation: Orientation) -> usize {
        let dim = self.data.dim();
        match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        }
    }

    #[inline]
    fn normalize_to_u8(value: f32) -> u8 {
        ((value / 65535.0) * 255.0).clamp(0.0, 255.0) as u8
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, u16>> {
        if index >= self.slice_count(orientation) {
            return None;
        }
        let slice = match orientation {
            Orientation::Axial => self.data().slice(s![index, .., ..]),
            Orientation::Coronal => self.data().slice(s![.., index, ..]),
            Orientation::Sagittal => self.data().slice(s![.., .., index]),
        };
        Some(slice)
    }

    fn get_output_dimensions(&self, orientation: Orientation) -> (u32, u32) {
        // Always return (width, height) - standard image convention
        match orientation {
            Orientation::Axial => (self.interpolated_dim.2, self.interpolated_dim.1),
            Orientation::Coronal => (self.interpolated_dim.2, self.interpolated_dim.0),
            Orientation::Sagittal => (self.interpolated_dim.1, self.interpolated_dim.0),
        }
    }

    fn slice_to_image(slice: &ArrayView2<'_, u16>) -> Option<SliceImage> {
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .iter()
            .map(|&v| Self::normalize_to_u8(f32::from(v)))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    /// Reformat one slice along `orientation` into an 8-bit image.
    ///
    /// Returns `None` for out-of-range indices and empty volumes.
    pub fn get_image_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
        interpolation: Interpolation,
    ) -> Option<SliceImage> {
        let slice = self.get_slice_from_axis(index, orientation)?;
        if slice.is_empty() {
            return None;
        }

        match interpolation {
            Interpolation::None => Self::slice_to_image(&slice),
            Interpolation::Bilinear(_) => {
                // Axial doesn't need interpolation (already isotropic in-plane)
                if matches!(orientation, Orientation::Axial) {
                    return Self::slice_to_image(&slice);
                }
                let (width, height) = self.get_output_dimensions(orientation);
                if width == 0 || height == 0 {
                    return None;
                }
                Self::interpolate_slice(&slice, width, height)
            }
        }
    }

    fn interpolate_slice(
        slice: &ArrayView2<'_, u16>,
        width: u32,
        height: u32,
    ) -> Option<SliceImage> {
        let (slice_height, slice_width) = slice.dim();

        let pixel_data: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map(|y| {
                (0..width)
                    .map(|x| {
                        let norm_x = (x as f32 + 0.5) / width as f32;
                        let norm_y = (y as f32 + 0.5) / height as f32;

                        let src_x = (norm_x * slice_width as f32 - 0.5)
                            .clamp(0.0, (slice_width - 1) as f32);
                        let src_y = (norm_y * slice_height as f32 - 0.5)
                            .clamp(0.0, (slice_height - 1) as f32);

                        let value = Interpolator::bilinear_interpolate(slice, src_y, src_x);
                        Self::normalize_to_u8(value)
                    })
                    .collect::<Vec<u8>>()
            })
            .collect();

        ImageBuffer::from_raw(width, height, pixel_data)
    }
}

/// Shared handle to a loaded volume, tagged with the identity it was loaded for.
#[derive(Clone, Debug)]
pub struct VolumeHandle {
    identity: VolumeIdentity,
    volume: Arc<Volume>,
}

impl VolumeHandle {
    pub fn new(identity: VolumeIdentity, volume: Volume) -> Self {
        Self {
            identity,
            volume: Arc::new(volume),
        }
    }

    pub fn identity(&self) -> VolumeIdentity {
        self.identity
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    /// Whether both handles point at the same loaded data.
    pub fn ptr_eq(&self, other: &VolumeHandle) -> bool {
        Arc::ptr_eq(&self.volume, &other.volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::Processor;

    fn ramp_volume() -> Volume {
        let data = Array3::from_shape_fn((4, 6, 8), |(z, y, x)| (z * 1000 + y * 100 + x) as u16);
        Volume::new(data, (1.0, 1.0, 2.0))
    }

    #[test]
    fn slice_counts_follow_axes() {
        let volume = ramp_volume();
        assert_eq!(volume.slice_count(Orientation::Axial), 4);
        assert_eq!(volume.slice_count(Orientation::Coronal), 6);
        assert_eq!(volume.slice_count(Orientation::Sagittal), 8);
    }

    #[test]
    fn out_of_range_index_yields_nothing() {
        let volume = ramp_volume();
        assert!(volume.get_slice_from_axis(4, Orientation::Axial).is_none());
        assert!(
            volume
                .get_image_from_axis(8, Orientation::Sagittal, Interpolation::None)
                .is_none()
        );
    }

    #[test]
    fn coronal_slice_is_stretched_when_interpolated() {
        let volume = ramp_volume();
        let raw = volume
            .get_image_from_axis(2, Orientation::Coronal, Interpolation::None)
            .expect("raw slice");
        assert_eq!(raw.dimensions(), (8, 4));

        let stretched = volume
            .get_image_from_axis(2, Orientation::Coronal, Interpolation::Bilinear(Processor::CPU))
            .expect("interpolated slice");
        assert_eq!(stretched.dimensions(), (8, 8));
    }

    #[test]
    fn handles_compare_by_data() {
        let volume = ramp_volume();
        let identity = VolumeIdentity::of(&[]);
        let a = VolumeHandle::new(identity, volume);
        let b = a.clone();
        let c = VolumeHandle::new(identity, ramp_volume());

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }
}
