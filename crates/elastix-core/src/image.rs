use std::path::{Path, PathBuf};

use ndarray::{ArrayD, Axis, IxDyn};

use crate::error::{ElastixError, Result};

/// An in-memory image with physical sampling.
///
/// Axes are in array (z-y-x) order; `spacing` and `origin` follow the same
/// order. Pixel values are f32.
#[derive(Clone, Debug)]
pub struct Image {
    pub data: ArrayD<f32>,
    /// Distance between samples along each axis, in world units.
    pub spacing: Vec<f64>,
    /// World position of the first sample along each axis.
    pub origin: Vec<f64>,
}

impl Image {
    /// Unit spacing, zero origin.
    pub fn new(data: ArrayD<f32>) -> Self {
        let ndim = data.ndim();
        Self {
            data,
            spacing: vec![1.0; ndim],
            origin: vec![0.0; ndim],
        }
    }

    pub fn with_sampling(data: ArrayD<f32>, spacing: Vec<f64>, origin: Vec<f64>) -> Result<Self> {
        let ndim = data.ndim();
        if spacing.len() != ndim || origin.len() != ndim {
            return Err(ElastixError::InvalidArgument(format!(
                "sampling for a {}D image needs {} values (got spacing {}, origin {})",
                ndim,
                ndim,
                spacing.len(),
                origin.len()
            )));
        }
        Ok(Self {
            data,
            spacing,
            origin,
        })
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Stack same-shaped images along a new leading axis.
    ///
    /// The stack axis gets unit spacing and zero origin.
    pub fn stack(images: &[Image]) -> Result<Image> {
        let first = images
            .first()
            .ok_or_else(|| ElastixError::InvalidArgument("no images to stack".into()))?;
        if let Some(bad) = images.iter().find(|im| im.shape() != first.shape()) {
            return Err(ElastixError::InvalidArgument(format!(
                "groupwise images must share a shape: {:?} vs {:?}",
                first.shape(),
                bad.shape()
            )));
        }

        let views: Vec<_> = images.iter().map(|im| im.data.view()).collect();
        let data = ndarray::stack(Axis(0), &views).map_err(|e| {
            ElastixError::InvalidArgument(format!("cannot stack images: {}", e))
        })?;

        let mut spacing = vec![1.0];
        spacing.extend_from_slice(&first.spacing);
        let mut origin = vec![0.0];
        origin.extend_from_slice(&first.origin);

        Ok(Image {
            data,
            spacing,
            origin,
        })
    }
}

/// Per-axis displacement arrays, in x-y-z order and world units.
#[derive(Clone, Debug)]
pub struct DeformationField {
    pub components: Vec<ArrayD<f32>>,
}

impl DeformationField {
    /// Split a vector image of shape `(..spatial.., channels)` into its first
    /// `ndim` channels.
    pub fn from_vector_image(vectors: &ArrayD<f32>, ndim: usize) -> Result<Self> {
        let channels = vectors.shape().last().copied().unwrap_or(0);
        if vectors.ndim() != ndim + 1 || channels < ndim {
            return Err(ElastixError::OutputParse(format!(
                "deformation field of shape {:?} does not describe a {}D displacement",
                vectors.shape(),
                ndim
            )));
        }
        let last = Axis(vectors.ndim() - 1);
        let components = (0..ndim)
            .map(|d| vectors.index_axis(last, d).to_owned())
            .collect();
        Ok(Self { components })
    }

    pub fn ndim(&self) -> usize {
        self.components.len()
    }

    /// Largest absolute displacement over all axes.
    pub fn max_abs(&self) -> f32 {
        self.components
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |acc, v| acc.max(v.abs()))
    }

    /// Shape of each component array.
    pub fn shape(&self) -> IxDyn {
        self.components
            .first()
            .map(|c| c.raw_dim())
            .unwrap_or_else(|| IxDyn(&[]))
    }
}

/// A registration input: an in-memory array or an existing file.
#[derive(Clone, Debug)]
pub enum ImageSource {
    Array(Image),
    Path(PathBuf),
}

impl ImageSource {
    pub fn as_array(&self) -> Option<&Image> {
        match self {
            Self::Array(im) => Some(im),
            Self::Path(_) => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Array(_) => None,
            Self::Path(p) => Some(p),
        }
    }
}

impl From<Image> for ImageSource {
    fn from(im: Image) -> Self {
        Self::Array(im)
    }
}

impl From<ArrayD<f32>> for ImageSource {
    fn from(data: ArrayD<f32>) -> Self {
        Self::Array(Image::new(data))
    }
}

impl From<PathBuf> for ImageSource {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

impl From<&Path> for ImageSource {
    fn from(p: &Path) -> Self {
        Self::Path(p.to_path_buf())
    }
}

/// The moving side of a registration: one image, or a group registered
/// jointly to their common mean.
#[derive(Clone, Debug)]
pub enum MovingImages {
    Single(ImageSource),
    Group(Vec<Image>),
}

impl From<ImageSource> for MovingImages {
    fn from(src: ImageSource) -> Self {
        Self::Single(src)
    }
}

impl From<Image> for MovingImages {
    fn from(im: Image) -> Self {
        Self::Single(ImageSource::Array(im))
    }
}

impl From<PathBuf> for MovingImages {
    fn from(p: PathBuf) -> Self {
        Self::Single(ImageSource::Path(p))
    }
}

impl From<Vec<Image>> for MovingImages {
    fn from(images: Vec<Image>) -> Self {
        Self::Group(images)
    }
}
