use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use log::{debug, info};
use ndarray::Array3;
use tiff::decoder::{Decoder, DecodingResult};

use super::{Dataset, Sample};
use crate::{Result, TrainErr};

/// The multi-spectral EuroSAT archive: one directory per land cover class, each holding a
/// GeoTIFF per tile.
///
/// Classes are sorted by name and labeled by position. Images are decoded lazily on `get`.
#[derive(Clone, Debug)]
pub struct EuroSat {
    root: PathBuf,
    classes: Vec<String>,
    files: Vec<(PathBuf, usize)>,
    shape: (usize, usize, usize),
}

impl EuroSat {
    /// Indexes the dataset found at `root`.
    ///
    /// # Arguments
    /// * `root` - The directory holding one subdirectory per class.
    /// * `shape` - The `(channels, height, width)` every image is expected to have.
    ///
    /// # Returns
    /// An error if `root` doesn't exist or holds no images.
    pub fn open<P: AsRef<Path>>(root: P, shape: (usize, usize, usize)) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(TrainErr::MissingDataset(root));
        }

        let mut class_dirs = Vec::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                class_dirs.push(entry.path());
            }
        }
        class_dirs.sort();

        let mut classes = Vec::with_capacity(class_dirs.len());
        let mut files = Vec::new();

        for (label, dir) in class_dirs.iter().enumerate() {
            let mut images = Vec::new();
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if is_tiff(&path) {
                    images.push(path);
                }
            }
            images.sort();

            let name = dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            debug!(class = name.as_str(), label = label, images = images.len(); "indexed class");
            files.extend(images.into_iter().map(|path| (path, label)));
            classes.push(name);
        }

        if files.is_empty() {
            return Err(TrainErr::EmptyDataset);
        }

        info!(
            "found {} images in {} classes under {}",
            files.len(),
            classes.len(),
            root.display()
        );

        Ok(Self {
            root,
            classes,
            files,
            shape,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The class names, indexed by label.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

fn is_tiff(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
}

impl Dataset for EuroSat {
    fn len(&self) -> usize {
        self.files.len()
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        let (path, label) = self.files.get(idx).ok_or(TrainErr::IndexOutOfRange {
            idx,
            len: self.files.len(),
        })?;

        let image = read_tiff(path, self.shape)?;
        Ok(Sample {
            image,
            label: *label,
        })
    }

    fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }
}

/// Decodes a chunky TIFF with any amount of bands (RGB, gray or 13 band BlackIsZero
/// multispectral tiles) into a `(channels, height, width)` float tensor.
///
/// # Arguments
/// * `path` - The image file.
/// * `shape` - The expected `(channels, height, width)`.
pub fn read_tiff(path: &Path, shape: (usize, usize, usize)) -> Result<Array3<f32>> {
    let tiff_err = |source| TrainErr::Tiff {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(tiff_err)?;
    let (width, height) = decoder.dimensions().map_err(tiff_err)?;
    let data = to_f32(decoder.read_image().map_err(tiff_err)?);

    let (width, height) = (width as usize, height as usize);
    let channels = data.len() / (width * height).max(1);

    if (channels, height, width) != shape || channels * height * width != data.len() {
        return Err(TrainErr::ShapeMismatch {
            what: path.display().to_string(),
            got: vec![channels, height, width],
            expected: vec![shape.0, shape.1, shape.2],
        });
    }

    let image = Array3::from_shape_vec((height, width, channels), data)?
        .permuted_axes([2, 0, 1])
        .as_standard_layout()
        .into_owned();

    Ok(image)
}

fn to_f32(decoded: DecodingResult) -> Vec<f32> {
    fn cast<T: Copy + Into<f64>>(data: Vec<T>) -> Vec<f32> {
        data.into_iter().map(|x| x.into() as f32).collect()
    }

    match decoded {
        DecodingResult::U8(data) => cast(data),
        DecodingResult::U16(data) => cast(data),
        DecodingResult::U32(data) => cast(data),
        DecodingResult::U64(data) => data.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(data) => cast(data),
        DecodingResult::I16(data) => cast(data),
        DecodingResult::I32(data) => cast(data),
        DecodingResult::I64(data) => data.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F16(data) => data.into_iter().map(|x| x.to_f32()).collect(),
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|x| x as f32).collect(),
    }
}
