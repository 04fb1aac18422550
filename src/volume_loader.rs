use crate::{enums::SortBy, frame::FrameReference, volume::Volume};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, s};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("Unsupported frame reference: {0}")]
    UnsupportedReference(String),

    #[error("Volume load was cancelled")]
    Cancelled,

    #[error("Volume source failed: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

type OrderedImage = (Option<f32>, Array2<u16>);

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from DICOM objects
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found or dimensions are inconsistent
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let mut images_with_order: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::extract_image_with_order(dicom_object, sort_by))
            .collect();

        if images_with_order.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_images(&mut images_with_order, sort_by);

        let images: Vec<_> = images_with_order
            .into_iter()
            .map(|(_, image)| image)
            .collect();

        Self::validate_dimensions(&images)?;

        let volume_array = Self::build_volume_array(&images);
        let spacing = Self::get_spacing(dicom_objects).ok_or(VolumeLoaderError::MissingSpacing)?;

        Ok(Volume::new(volume_array, spacing))
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Resolve every reference to a local path.
    ///
    /// Fails on the first reference that does not address a local file;
    /// remote schemes belong to the image-fetch layer.
    pub fn resolve_paths(frames: &[FrameReference]) -> Result<Vec<PathBuf>, VolumeLoaderError> {
        frames
            .iter()
            .map(|frame| {
                frame
                    .local_path()
                    .ok_or_else(|| VolumeLoaderError::UnsupportedReference(frame.to_string()))
            })
            .collect()
    }

    /// Load a volume from an ordered list of file-backed frame references
    pub fn load_from_frames(
        frames: &[FrameReference],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        if frames.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        let paths = Self::resolve_paths(frames)?;
        Self::load_from_file_paths(&paths, sort_by)
    }

    /// `dicomfile:` references for every .dcm file in a directory, in file name order
    pub fn frame_references_in(
        path: impl AsRef<Path>,
    ) -> Result<Vec<FrameReference>, VolumeLoaderError> {
        let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| FrameReference::new(format!("dicomfile:{}", path.display())))
            .collect())
    }

    fn extract_image_with_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: SortBy,
    ) -> Option<OrderedImage> {
        let order = Self::get_sort_order(dicom_object, sort_by)?;
        let image_2d = Self::decode_image(dicom_object)?;
        Some((order, image_2d))
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: SortBy,
    ) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                Some(pos.get(2).copied())
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float32()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<u16>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
        pixel_data
            .to_ndarray_with_options::<u16>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn sort_images(images_with_order: &mut [OrderedImage], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            images_with_order
                .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        }

        if matches!(sort_by, SortBy::ImagePositionPatient) {
            images_with_order.reverse();
        }
    }

    fn validate_dimensions(images: &[Array2<u16>]) -> Result<(), VolumeLoaderError> {
        let first_dim = images[0].dim();
        if images.iter().any(|img| img.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(images: &[Array2<u16>]) -> Array3<u16> {
        let (height, width) = images[0].dim();
        let depth = images.len();
        let mut volume = Array3::<u16>::zeros((depth, height, width));

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(image);
        }

        volume
    }

    fn get_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<(f32, f32, f32)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float32()
                .ok()?;

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float32()
                .ok()?;

            Some((pixel_spacing[0], pixel_spacing[1], slice_thickness))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_references_are_rejected() {
        let frames = vec![
            FrameReference::new("dicomfile:/data/1.dcm"),
            FrameReference::new("wadouri:https://pacs/2.dcm"),
        ];
        let err = VolumeLoader::resolve_paths(&frames).unwrap_err();
        assert!(matches!(err, VolumeLoaderError::UnsupportedReference(r) if r.starts_with("wadouri:")));
    }

    #[test]
    fn empty_frame_list_has_no_images() {
        let err = VolumeLoader::load_from_frames(&[], SortBy::None).unwrap_err();
        assert!(matches!(err, VolumeLoaderError::NoValidImages));
    }

    #[test]
    fn directory_listing_only_picks_dcm_files_in_name_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        for name in ["b.dcm", "a.DCM", "notes.txt"] {
            fs::write(dir.path().join(name), b"").expect("write file");
        }

        let frames = VolumeLoader::frame_references_in(dir.path()).expect("listing");
        assert_eq!(frames.len(), 2);
        assert!(frames[0].as_str().ends_with("a.DCM"));
        assert!(frames[1].as_str().ends_with("b.dcm"));
        assert_eq!(frames[0].scheme(), Some("dicomfile"));
    }

    #[test]
    fn volume_stacks_images_in_order() {
        let images = vec![Array2::from_elem((2, 3), 1u16), Array2::from_elem((2, 3), 2u16)];
        let volume = VolumeLoader::build_volume_array(&images);
        assert_eq!(volume.dim(), (2, 2, 3));
        assert_eq!(volume[[1, 0, 0]], 2);
    }

    #[test]
    fn mismatched_images_are_rejected() {
        let images = vec![Array2::from_elem((2, 3), 1u16), Array2::from_elem((3, 3), 2u16)];
        assert!(matches!(
            VolumeLoader::validate_dimensions(&images),
            Err(VolumeLoaderError::InconsistentDimensions)
        ));
    }
}
