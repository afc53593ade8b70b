//! Reader for the Gaussian splat flavour of PLY.
//!
//! Accepts `ascii`, `binary_little_endian` and `binary_big_endian` bodies.
//! Every element is walked so the "vertex" rows can sit anywhere in the
//! file, but only the vertex properties a splat needs are kept.

use foldhash::HashMap;
use foldhash::HashMapExt;
use half::f16;
use std::fmt;
use std::str::FromStr;

use crate::error::SplatError;
use crate::structures::{PointCloud, Vertex};

pub const VERTEX_ELEMENT: &str = "vertex";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float16,
    Float32,
    Float64,
}

impl ScalarType {
    fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "char" | "int8" => ScalarType::Int8,
            "uchar" | "uint8" => ScalarType::UInt8,
            "short" | "int16" => ScalarType::Int16,
            "ushort" | "uint16" => ScalarType::UInt16,
            "int" | "int32" => ScalarType::Int32,
            "uint" | "uint32" => ScalarType::UInt32,
            "half" | "float16" => ScalarType::Float16,
            "float" | "float32" => ScalarType::Float32,
            "double" | "float64" => ScalarType::Float64,
            _ => return None,
        };
        Some(ty)
    }

    pub fn size(self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 | ScalarType::Float16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float32 => 4,
            ScalarType::Float64 => 8,
        }
    }

    /// Decodes one value. `bytes` must hold at least `self.size()` bytes.
    /// Every supported type fits in an f64 without loss.
    #[inline]
    fn decode(self, bytes: &[u8], big_endian: bool) -> f64 {
        macro_rules! read {
            ($t:ty) => {{
                let mut buf = [0u8; size_of::<$t>()];
                buf.copy_from_slice(&bytes[..size_of::<$t>()]);
                if big_endian {
                    <$t>::from_be_bytes(buf)
                } else {
                    <$t>::from_le_bytes(buf)
                }
            }};
        }

        match self {
            ScalarType::Int8 => read!(i8) as f64,
            ScalarType::UInt8 => read!(u8) as f64,
            ScalarType::Int16 => read!(i16) as f64,
            ScalarType::UInt16 => read!(u16) as f64,
            ScalarType::Int32 => read!(i32) as f64,
            ScalarType::UInt32 => read!(u32) as f64,
            ScalarType::Float16 => f16::from_bits(read!(u16)).to_f64(),
            ScalarType::Float32 => read!(f32) as f64,
            ScalarType::Float64 => read!(f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Scalar(ScalarType),
    List { count: ScalarType, item: ScalarType },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDef {
    pub name: String,
    pub count: usize,
    pub properties: Vec<PropertyDef>,
}

impl ElementDef {
    fn min_row_size(&self) -> usize {
        self.properties
            .iter()
            .map(|p| match p.kind {
                PropertyKind::Scalar(ty) => ty.size(),
                PropertyKind::List { count, .. } => count.size(),
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyHeader {
    pub encoding: Encoding,
    pub elements: Vec<ElementDef>,
}

/// Column index of every property a splat needs.
struct VertexLayout {
    position: [usize; 3],
    log_scale: [usize; 3],
    rotation: [usize; 4],
    color_dc: [usize; 3],
    opacity: usize,
}

impl VertexLayout {
    fn resolve(element: &ElementDef) -> Result<Self, SplatError> {
        let mut field_map: HashMap<&str, usize> = HashMap::with_capacity(element.properties.len());
        for (i, prop) in element.properties.iter().enumerate() {
            if field_map.insert(prop.name.as_str(), i).is_some() {
                return Err(SplatError::format(format!(
                    "Duplicate property '{}' in element '{}'",
                    prop.name, element.name
                )));
            }
        }

        let idx = |name: &str| idx_of(element, &field_map, name);
        Ok(VertexLayout {
            position: [idx("x")?, idx("y")?, idx("z")?],
            log_scale: [idx("scale_0")?, idx("scale_1")?, idx("scale_2")?],
            rotation: [idx("rot_0")?, idx("rot_1")?, idx("rot_2")?, idx("rot_3")?],
            color_dc: [idx("f_dc_0")?, idx("f_dc_1")?, idx("f_dc_2")?],
            opacity: idx("opacity")?,
        })
    }

    #[inline]
    fn vertex(&self, row: &[f32]) -> Vertex {
        let at = |i: usize| row[i];
        Vertex {
            position: self.position.map(at),
            log_scale: self.log_scale.map(at),
            rotation: self.rotation.map(at),
            color_dc: self.color_dc.map(at),
            opacity: row[self.opacity],
        }
    }
}

#[inline(always)]
fn idx_of(
    element: &ElementDef,
    field_map: &HashMap<&str, usize>,
    name: &str,
) -> Result<usize, SplatError> {
    let idx = field_map
        .get(name)
        .copied()
        .ok_or_else(|| SplatError::format(format!("Missing required property: {}", name)))?;
    match element.properties[idx].kind {
        PropertyKind::Scalar(_) => Ok(idx),
        PropertyKind::List { .. } => Err(SplatError::format(format!(
            "Property '{}' is a list, expected a scalar",
            name
        ))),
    }
}

#[inline]
fn next_line<'b>(buffer: &'b [u8], offset: &mut usize) -> Option<&'b [u8]> {
    if *offset >= buffer.len() {
        return None;
    }
    let start = *offset;

    let line = match memchr::memchr(b'\n', &buffer[start..]) {
        Some(pos) => {
            *offset = start + pos + 1;
            &buffer[start..start + pos]
        }
        None => {
            *offset = buffer.len();
            &buffer[start..]
        }
    };
    Some(line.strip_suffix(b"\r").unwrap_or(line))
}

fn next_text_line<'b>(buffer: &'b [u8], offset: &mut usize) -> Result<Option<&'b str>, SplatError> {
    next_line(buffer, offset)
        .map(|line| {
            std::str::from_utf8(line)
                .map_err(|e| SplatError::format(format!("UTF-8 error: {}", e)))
        })
        .transpose()
}

fn parse_scalar_type(name: Option<&str>) -> Result<ScalarType, SplatError> {
    let name = name.ok_or_else(|| SplatError::format("Property line is missing its type"))?;
    ScalarType::from_name(name)
        .ok_or_else(|| SplatError::format(format!("Unsupported property type: {}", name)))
}

/// Parses the header and returns it together with the byte offset of the body.
pub fn parse_header(raw_data: &[u8]) -> Result<(PlyHeader, usize), SplatError> {
    let mut offset = 0;

    let magic = next_text_line(raw_data, &mut offset)?
        .ok_or_else(|| SplatError::format("No 'ply' line"))?;
    if magic.trim_end() != "ply" {
        return Err(SplatError::format("Not a .ply file (missing 'ply' header)"));
    }

    let mut encoding = None;
    let mut elements: Vec<ElementDef> = Vec::new();
    loop {
        let line = next_text_line(raw_data, &mut offset)?
            .ok_or_else(|| SplatError::format("No 'end_header' found before EOF"))?;
        let mut tokens = line.split_ascii_whitespace();

        match tokens.next() {
            None | Some("comment") | Some("obj_info") => continue,
            Some("end_header") => break,
            Some("format") => {
                let enc = match (tokens.next(), tokens.next()) {
                    (Some("ascii"), Some("1.0")) => Encoding::Ascii,
                    (Some("binary_little_endian"), Some("1.0")) => Encoding::BinaryLittleEndian,
                    (Some("binary_big_endian"), Some("1.0")) => Encoding::BinaryBigEndian,
                    _ => {
                        return Err(SplatError::format(format!(
                            "Unsupported .ply format line: {}",
                            line
                        )))
                    }
                };
                encoding = Some(enc);
            }
            Some("element") => {
                let (Some(name), Some(count)) = (tokens.next(), tokens.next()) else {
                    return Err(SplatError::format(format!("Malformed element line: {}", line)));
                };
                let count = count.parse().map_err(|e| {
                    SplatError::format(format!("Bad row count for element '{}': {}", name, e))
                })?;
                elements.push(ElementDef {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let element = elements.last_mut().ok_or_else(|| {
                    SplatError::format("Property declared before any element")
                })?;
                let first = tokens.next();
                let kind = if first == Some("list") {
                    PropertyKind::List {
                        count: parse_scalar_type(tokens.next())?,
                        item: parse_scalar_type(tokens.next())?,
                    }
                } else {
                    PropertyKind::Scalar(parse_scalar_type(first)?)
                };
                let name = tokens.next().ok_or_else(|| {
                    SplatError::format(format!("Property line is missing its name: {}", line))
                })?;
                element.properties.push(PropertyDef {
                    name: name.to_string(),
                    kind,
                });
            }
            Some(_) => {
                return Err(SplatError::format(format!(
                    "Unsupported header line: {}",
                    line
                )))
            }
        }
    }

    let encoding = encoding.ok_or_else(|| SplatError::format("Missing format line"))?;
    // Rows without properties occupy no data, so their count can't be checked.
    if let Some(element) = elements.iter().find(|e| e.count > 0 && e.properties.is_empty()) {
        return Err(SplatError::format(format!(
            "Element '{}' declares {} rows but no properties",
            element.name, element.count
        )));
    }
    Ok((PlyHeader { encoding, elements }, offset))
}

/// Reads every vertex of a splat PLY in file order.
pub fn read_point_cloud(raw_data: &[u8]) -> Result<PointCloud, SplatError> {
    let _span = tracing::trace_span!("read_point_cloud").entered();

    let (header, offset) = parse_header(raw_data)?;
    let vertex_idx = header
        .elements
        .iter()
        .position(|e| e.name == VERTEX_ELEMENT)
        .ok_or_else(|| SplatError::format("Missing 'element vertex' definition"))?;
    let layout = VertexLayout::resolve(&header.elements[vertex_idx])?;

    let body = &raw_data[offset..];
    let vertices = match header.encoding {
        Encoding::Ascii => read_ascii(&header, vertex_idx, &layout, body)?,
        Encoding::BinaryLittleEndian => read_binary(&header, vertex_idx, &layout, body, false)?,
        Encoding::BinaryBigEndian => read_binary(&header, vertex_idx, &layout, body, true)?,
    };

    tracing::debug!(
        vertices = vertices.len(),
        encoding = ?header.encoding,
        "Read point cloud"
    );
    Ok(PointCloud { vertices })
}

fn short_rows(element: &ElementDef, present: usize) -> SplatError {
    SplatError::format(format!(
        "Element '{}' declares {} rows but only {} are present",
        element.name, element.count, present
    ))
}

fn list_len(value: f64) -> Result<usize, SplatError> {
    if value < 0.0 || value.fract() != 0.0 || !value.is_finite() {
        return Err(SplatError::format(format!("Invalid list length: {}", value)));
    }
    Ok(value as usize)
}

#[inline]
fn take<'b>(data: &'b [u8], cursor: &mut usize, len: usize) -> Option<&'b [u8]> {
    let end = cursor.checked_add(len)?;
    let bytes = data.get(*cursor..end)?;
    *cursor = end;
    Some(bytes)
}

#[inline(never)]
fn read_binary(
    header: &PlyHeader,
    vertex_idx: usize,
    layout: &VertexLayout,
    data: &[u8],
    big_endian: bool,
) -> Result<Vec<Vertex>, SplatError> {
    let mut cursor = 0;
    let mut vertices = Vec::new();

    for (ei, element) in header.elements.iter().enumerate() {
        let is_vertex = ei == vertex_idx;
        if is_vertex {
            // Never trust the declared count further than the data can back it.
            let max_rows = data.len() / element.min_row_size().max(1);
            vertices.reserve_exact(element.count.min(max_rows));
        }

        let mut row = vec![0.0f32; element.properties.len()];
        for r in 0..element.count {
            for (pi, prop) in element.properties.iter().enumerate() {
                match prop.kind {
                    PropertyKind::Scalar(ty) => {
                        let bytes = take(data, &mut cursor, ty.size())
                            .ok_or_else(|| short_rows(element, r))?;
                        row[pi] = ty.decode(bytes, big_endian) as f32;
                    }
                    PropertyKind::List { count, item } => {
                        let bytes = take(data, &mut cursor, count.size())
                            .ok_or_else(|| short_rows(element, r))?;
                        let len = list_len(count.decode(bytes, big_endian))?;
                        let skip = len.checked_mul(item.size()).ok_or_else(|| {
                            SplatError::format("Overflow in list length calculation")
                        })?;
                        take(data, &mut cursor, skip).ok_or_else(|| short_rows(element, r))?;
                    }
                }
            }
            if is_vertex {
                vertices.push(layout.vertex(&row));
            }
        }
    }

    if cursor != data.len() {
        return Err(SplatError::format(format!(
            "{} trailing bytes after the last declared row",
            data.len() - cursor
        )));
    }
    Ok(vertices)
}

fn next_data_line<'b>(data: &'b [u8], offset: &mut usize) -> Result<Option<&'b str>, SplatError> {
    while let Some(line) = next_text_line(data, offset)? {
        if !line.trim().is_empty() {
            return Ok(Some(line));
        }
    }
    Ok(None)
}

fn parse_token<T>(
    token: Option<&str>,
    element: &ElementDef,
    row: usize,
    prop: &PropertyDef,
) -> Result<T, SplatError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let token = token.ok_or_else(|| {
        SplatError::format(format!(
            "Row {} of element '{}' is missing property '{}'",
            row, element.name, prop.name
        ))
    })?;
    token.parse().map_err(|e| {
        SplatError::format(format!(
            "Bad value '{}' for property '{}' in row {}: {}",
            token, prop.name, row, e
        ))
    })
}

#[inline(never)]
fn read_ascii(
    header: &PlyHeader,
    vertex_idx: usize,
    layout: &VertexLayout,
    data: &[u8],
) -> Result<Vec<Vertex>, SplatError> {
    let mut offset = 0;
    let mut vertices = Vec::new();

    for (ei, element) in header.elements.iter().enumerate() {
        let is_vertex = ei == vertex_idx;
        let mut row = vec![0.0f32; element.properties.len()];

        for r in 0..element.count {
            let line = next_data_line(data, &mut offset)?.ok_or_else(|| short_rows(element, r))?;
            let mut tokens = line.split_ascii_whitespace();

            for (pi, prop) in element.properties.iter().enumerate() {
                match prop.kind {
                    PropertyKind::Scalar(ScalarType::Float32) => {
                        row[pi] = parse_token::<f32>(tokens.next(), element, r, prop)?;
                    }
                    PropertyKind::Scalar(_) => {
                        row[pi] = parse_token::<f64>(tokens.next(), element, r, prop)? as f32;
                    }
                    PropertyKind::List { .. } => {
                        let len = list_len(parse_token(tokens.next(), element, r, prop)?)?;
                        for _ in 0..len {
                            parse_token::<f64>(tokens.next(), element, r, prop)?;
                        }
                    }
                }
            }
            if tokens.next().is_some() {
                return Err(SplatError::format(format!(
                    "Row {} of element '{}' has more values than declared properties",
                    r, element.name
                )));
            }
            if is_vertex {
                vertices.push(layout.vertex(&row));
            }
        }
    }

    if next_data_line(data, &mut offset)?.is_some() {
        return Err(SplatError::format(
            "More rows present than the header declares",
        ));
    }
    Ok(vertices)
}
