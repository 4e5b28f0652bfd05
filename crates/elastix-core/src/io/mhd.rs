//! MetaImage (`.mhd` header + `.raw` data) reading and writing.
//!
//! This is the format elastix and transformix exchange images in. Header
//! vectors (`DimSize`, `ElementSpacing`, `Offset`) are in x-y-z order; the
//! in-memory [`Image`] uses the reversed (z-y-x) array order.

use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use ndarray::{ArrayD, IxDyn};
use num_traits::AsPrimitive;

use crate::error::{ElastixError, Result};
use crate::image::Image;

/// MetaImage element types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ElementType {
    pub fn met_name(&self) -> &'static str {
        match self {
            Self::U8 => "MET_UCHAR",
            Self::I8 => "MET_CHAR",
            Self::U16 => "MET_USHORT",
            Self::I16 => "MET_SHORT",
            Self::U32 => "MET_UINT",
            Self::I32 => "MET_INT",
            Self::U64 => "MET_ULONG",
            Self::I64 => "MET_LONG",
            Self::F32 => "MET_FLOAT",
            Self::F64 => "MET_DOUBLE",
        }
    }

    pub fn from_met_name(name: &str) -> Option<Self> {
        let t = match name.trim().to_ascii_uppercase().as_str() {
            "MET_UCHAR" => Self::U8,
            "MET_CHAR" => Self::I8,
            "MET_USHORT" => Self::U16,
            "MET_SHORT" => Self::I16,
            "MET_UINT" => Self::U32,
            "MET_INT" => Self::I32,
            "MET_ULONG" | "MET_ULONG_LONG" => Self::U64,
            "MET_LONG" | "MET_LONG_LONG" => Self::I64,
            "MET_FLOAT" => Self::F32,
            "MET_DOUBLE" => Self::F64,
            _ => return None,
        };
        Some(t)
    }

    /// Bytes per element.
    pub fn size(&self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }
}

/// Parsed `.mhd` header.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaHeader {
    /// Image size per axis, x-y-z order.
    pub dim_size: Vec<usize>,
    /// Spacing per axis, x-y-z order.
    pub element_spacing: Vec<f64>,
    /// World position of the first voxel, x-y-z order.
    pub offset: Vec<f64>,
    pub element_type: ElementType,
    /// Vector components per voxel (1 for scalar images).
    pub channels: usize,
    pub byte_order_msb: bool,
    pub compressed: bool,
    /// Data file, relative to the header's directory.
    pub data_file: String,
}

impl MetaHeader {
    pub fn ndims(&self) -> usize {
        self.dim_size.len()
    }

    /// Number of voxels (not counting channels).
    pub fn voxel_count(&self) -> usize {
        self.dim_size.iter().product()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut ndims: Option<usize> = None;
        let mut dim_size = None;
        let mut spacing = None;
        let mut offset = None;
        let mut element_type = None;
        let mut channels = 1usize;
        let mut msb = false;
        let mut compressed = false;
        let mut data_file = None;

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "NDims" => ndims = Some(parse_num(key, value)?),
                "DimSize" => dim_size = Some(parse_list::<usize>(key, value)?),
                "ElementSpacing" => spacing = Some(parse_list::<f64>(key, value)?),
                "ElementSize" if spacing.is_none() => {
                    spacing = Some(parse_list::<f64>(key, value)?)
                }
                "Offset" | "Origin" | "Position" => offset = Some(parse_list::<f64>(key, value)?),
                "ElementType" => {
                    element_type = Some(ElementType::from_met_name(value).ok_or_else(|| {
                        ElastixError::OutputParse(format!("unknown ElementType: {}", value))
                    })?)
                }
                "ElementNumberOfChannels" => channels = parse_num(key, value)?,
                "BinaryDataByteOrderMSB" | "ElementByteOrderMSB" => msb = parse_bool(value),
                "CompressedData" => compressed = parse_bool(value),
                "ElementDataFile" => data_file = Some(value.to_string()),
                _ => {}
            }
        }

        let dim_size: Vec<usize> = dim_size.ok_or_else(|| missing("DimSize"))?;
        let n = ndims.unwrap_or(dim_size.len());
        if dim_size.len() != n {
            return Err(ElastixError::OutputParse(format!(
                "NDims = {} but DimSize has {} entries",
                n,
                dim_size.len()
            )));
        }
        let element_spacing = spacing.unwrap_or_else(|| vec![1.0; n]);
        let offset = offset.unwrap_or_else(|| vec![0.0; n]);
        if element_spacing.len() != n || offset.len() != n {
            return Err(ElastixError::OutputParse(format!(
                "ElementSpacing/Offset do not have {} entries",
                n
            )));
        }

        Ok(Self {
            dim_size,
            element_spacing,
            offset,
            element_type: element_type.ok_or_else(|| missing("ElementType"))?,
            channels: channels.max(1),
            byte_order_msb: msb,
            compressed,
            data_file: data_file.ok_or_else(|| missing("ElementDataFile"))?,
        })
    }

    /// Render the header text. `ElementDataFile` comes last, as MetaIO requires.
    pub fn to_text(&self) -> String {
        let n = self.ndims();
        let mut lines = vec![
            "ObjectType = Image".to_string(),
            format!("NDims = {}", n),
            "BinaryData = True".to_string(),
            format!("BinaryDataByteOrderMSB = {}", title_bool(self.byte_order_msb)),
            format!("CompressedData = {}", title_bool(self.compressed)),
            format!("Offset = {}", join(&self.offset)),
            format!("CenterOfRotation = {}", join(&vec![0; n])),
            format!("ElementSpacing = {}", join(&self.element_spacing)),
            format!("DimSize = {}", join(&self.dim_size)),
        ];
        if self.channels > 1 {
            lines.push(format!("ElementNumberOfChannels = {}", self.channels));
        }
        lines.push(format!("ElementType = {}", self.element_type.met_name()));
        lines.push(format!("ElementDataFile = {}", self.data_file));
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

fn missing(key: &str) -> ElastixError {
    ElastixError::OutputParse(format!("MetaImage header has no {}", key))
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ElastixError::OutputParse(format!("bad {} value: {:?}", key.trim(), value)))
}

fn parse_list<T: std::str::FromStr>(key: &str, value: &str) -> Result<Vec<T>> {
    value
        .split_whitespace()
        .map(|v| parse_num(key, v))
        .collect()
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn title_bool(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read only the header of a `.mhd` file.
pub fn read_header(path: &Path) -> Result<MetaHeader> {
    let text = fs::read_to_string(path)?;
    MetaHeader::parse(&text)
}

/// Write `image` as `<stem>.mhd` + `<stem>.raw` (MET_FLOAT, little endian)
/// in `dir`. Returns the header path.
pub fn write_mhd(image: &Image, dir: &Path, stem: &str) -> Result<PathBuf> {
    let raw_name = format!("{}.raw", stem);
    let header = MetaHeader {
        dim_size: image.shape().iter().rev().copied().collect(),
        element_spacing: image.spacing.iter().rev().copied().collect(),
        offset: image.origin.iter().rev().copied().collect(),
        element_type: ElementType::F32,
        channels: 1,
        byte_order_msb: false,
        compressed: false,
        data_file: raw_name.clone(),
    };

    // Logical iteration order is row-major, i.e. x varies fastest.
    let mut writer = BufWriter::new(File::create(dir.join(&raw_name))?);
    for &v in image.data.iter() {
        writer.write_f32::<LittleEndian>(v)?;
    }
    writer.flush()?;

    let mhd_path = dir.join(format!("{}.mhd", stem));
    fs::write(&mhd_path, header.to_text())?;
    Ok(mhd_path)
}

/// Read a `.mhd` image, converting any element type to f32.
///
/// Vector images get a trailing channel axis, with unit spacing and zero
/// origin along it. A header without `ElementNumberOfChannels` whose data
/// holds an exact multiple of the voxel count is read as a vector image too.
pub fn read_mhd(path: &Path) -> Result<Image> {
    let header = read_header(path)?;
    if header.compressed {
        return Err(ElastixError::OutputParse(format!(
            "{}: compressed MetaImage data is not supported",
            path.display()
        )));
    }
    if matches!(header.data_file.as_str(), "LOCAL" | "LIST") {
        return Err(ElastixError::OutputParse(format!(
            "{}: ElementDataFile = {} is not supported",
            path.display(),
            header.data_file
        )));
    }

    let raw_path = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&header.data_file);
    let file = File::open(&raw_path)?;
    if file.metadata()?.len() == 0 {
        return Err(ElastixError::OutputParse(format!(
            "{}: data file is empty",
            raw_path.display()
        )));
    }
    let mmap = unsafe { Mmap::map(&file)? };

    let elem = header.element_type.size();
    if mmap.len() % elem != 0 {
        return Err(ElastixError::OutputParse(format!(
            "{}: {} bytes is not a whole number of {} elements",
            raw_path.display(),
            mmap.len(),
            header.element_type.met_name()
        )));
    }
    let count = mmap.len() / elem;
    let voxels = header.voxel_count();
    let channels = if header.channels > 1 {
        header.channels
    } else if voxels > 0 && count != voxels && count % voxels == 0 {
        count / voxels
    } else {
        1
    };
    if voxels * channels != count {
        return Err(ElastixError::OutputParse(format!(
            "cannot apply shape {:?} x {} channel(s) to {} elements",
            header.dim_size, channels, count
        )));
    }

    let values = if header.byte_order_msb {
        decode::<BigEndian>(&mmap, header.element_type, count)?
    } else {
        decode::<LittleEndian>(&mmap, header.element_type, count)?
    };

    let mut shape: Vec<usize> = header.dim_size.iter().rev().copied().collect();
    let mut spacing: Vec<f64> = header.element_spacing.iter().rev().copied().collect();
    let mut origin: Vec<f64> = header.offset.iter().rev().copied().collect();
    if channels > 1 {
        shape.push(channels);
        spacing.push(1.0);
        origin.push(0.0);
    }

    let data = ArrayD::from_shape_vec(IxDyn(&shape), values)
        .map_err(|e| ElastixError::OutputParse(format!("cannot shape image data: {}", e)))?;
    Image::with_sampling(data, spacing, origin)
}

fn widen<T: AsPrimitive<f32>>(values: Vec<T>) -> Vec<f32> {
    values.into_iter().map(|v| v.as_()).collect()
}

fn decode<B: ByteOrder>(bytes: &[u8], ty: ElementType, count: usize) -> Result<Vec<f32>> {
    let mut rdr = Cursor::new(bytes);

    macro_rules! read_as {
        ($t:ty, $read:ident) => {{
            let mut buf = vec![<$t>::default(); count];
            rdr.$read::<B>(&mut buf)?;
            widen(buf)
        }};
    }

    let values = match ty {
        ElementType::U8 => bytes[..count].iter().map(|&b| b as f32).collect(),
        ElementType::I8 => bytes[..count].iter().map(|&b| b as i8 as f32).collect(),
        ElementType::U16 => read_as!(u16, read_u16_into),
        ElementType::I16 => read_as!(i16, read_i16_into),
        ElementType::U32 => read_as!(u32, read_u32_into),
        ElementType::I32 => read_as!(i32, read_i32_into),
        ElementType::U64 => read_as!(u64, read_u64_into),
        ElementType::I64 => read_as!(i64, read_i64_into),
        ElementType::F32 => read_as!(f32, read_f32_into),
        ElementType::F64 => read_as!(f64, read_f64_into),
    };
    Ok(values)
}
