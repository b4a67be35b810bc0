use std::io::{BufRead, BufWriter, Read, Write};
use std::path::Path;

use super::{
    properties::{PlyDataType, PlyPropertyDefinition, PlyType, XYZNormalsProperty, XYZProperty},
    DynamicProperty, PlyError, PlyPropertyTrait,
};
use crate::pointcloud::PointCloud;

#[derive(Debug, Clone, Copy, PartialEq)]
enum PlyEncoding {
    BinaryLittleEndian,
    Ascii,
}

struct PlyHeader {
    pub vertex_count: usize,
    pub format: PlyType,
    pub encoding: PlyEncoding,
}

fn parse_header<R: BufRead>(reader: &mut R) -> Result<PlyHeader, PlyError> {
    let mut line = String::new();
    let mut vertex_count = None;
    let mut encoding = None;
    let mut is_ply = false;
    let mut in_vertex_element = false;
    let mut properties = Vec::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PlyError::MalformedHeader("missing end_header".into()));
        }
        let trimmed = line.trim();

        if trimmed == "ply" {
            is_ply = true;
            continue;
        }

        if trimmed == "end_header" {
            break;
        }

        if trimmed.starts_with("format binary_little_endian") {
            encoding = Some(PlyEncoding::BinaryLittleEndian);
        } else if trimmed.starts_with("format ascii") {
            encoding = Some(PlyEncoding::Ascii);
        } else if trimmed.starts_with("format") {
            return Err(PlyError::UnsupportedProperty);
        } else if let Some(element) = trimmed.strip_prefix("element") {
            let mut parts = element.split_whitespace();
            let name = parts.next();
            if name == Some("vertex") {
                let count = parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| PlyError::MalformedHeader("invalid vertex count".into()))?;
                vertex_count = Some(count);
                in_vertex_element = true;
            } else {
                // vertex records must come first in the body
                if vertex_count.is_none() {
                    return Err(PlyError::UnsupportedProperty);
                }
                in_vertex_element = false;
            }
        } else if trimmed.starts_with("property") && in_vertex_element {
            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            if parts.len() >= 3 {
                if parts[1] == "list" {
                    return Err(PlyError::UnsupportedProperty);
                }
                let data_type = parse_data_type(parts[1])?;
                let name = parts[2].to_string();
                properties.push(PlyPropertyDefinition { name, data_type });
            }
        }
    }

    if !is_ply {
        return Err(PlyError::MalformedHeader("missing ply magic".into()));
    }
    let encoding = encoding.ok_or(PlyError::UnsupportedProperty)?;
    let vertex_count =
        vertex_count.ok_or_else(|| PlyError::MalformedHeader("missing vertex element".into()))?;
    let format = PlyType::detect_format(&properties)?;

    Ok(PlyHeader {
        vertex_count,
        format,
        encoding,
    })
}

fn parse_data_type(type_str: &str) -> Result<PlyDataType, PlyError> {
    match type_str {
        "float" | "float32" => Ok(PlyDataType::Float32),
        "double" | "float64" => Ok(PlyDataType::Float64),
        "char" | "int8" => Ok(PlyDataType::Int8),
        "uchar" | "uint8" => Ok(PlyDataType::UInt8),
        "short" | "int16" => Ok(PlyDataType::Int16),
        "ushort" | "uint16" => Ok(PlyDataType::UInt16),
        "int" | "int32" => Ok(PlyDataType::Int32),
        "uint" | "uint32" => Ok(PlyDataType::UInt32),
        _ => Err(PlyError::UnsupportedProperty),
    }
}

/// Read a PLY file with automatic format detection.
///
/// Binary little-endian and ASCII bodies are supported. Only the vertex
/// element is read; it must be the first element of the file. Normals and
/// colors are returned only when the header declares them.
pub fn read_ply(path: impl AsRef<Path>) -> Result<PointCloud, PlyError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let header = parse_header(&mut reader)?;

    let mut points = Vec::with_capacity(header.vertex_count);
    let mut colors = Vec::new();
    let mut normals = Vec::new();

    let mut push_vertex = |vertex: &dyn PlyPropertyTrait| {
        points.push(vertex.to_point());
        if header.format.has_colors() {
            colors.push(vertex.to_color());
        }
        if header.format.has_normals() {
            normals.push(vertex.to_normal());
        }
    };

    match header.encoding {
        PlyEncoding::BinaryLittleEndian => {
            let mut buffer = vec![0u8; header.format.size_of()];
            for _ in 0..header.vertex_count {
                reader.read_exact(&mut buffer)?;
                let vertex = header.format.deserialize(&buffer)?;
                push_vertex(&vertex);
            }
        }
        PlyEncoding::Ascii => {
            let schema = match &header.format {
                PlyType::Dynamic(props) => props.clone(),
                PlyType::XYZ => float_schema(&["x", "y", "z"]),
                PlyType::XYZNormals => float_schema(&["x", "y", "z", "nx", "ny", "nz"]),
                PlyType::XYZRgbNormals => {
                    let mut props = float_schema(&["x", "y", "z"]);
                    for name in ["red", "green", "blue"] {
                        props.push(PlyPropertyDefinition {
                            name: name.to_string(),
                            data_type: PlyDataType::UInt8,
                        });
                    }
                    props.extend(float_schema(&["nx", "ny", "nz"]));
                    props
                }
            };
            let mut line = String::new();
            let mut read = 0;
            while read < header.vertex_count {
                line.clear();
                if reader.read_line(&mut line)? == 0 {
                    return Err(PlyError::MalformedHeader(format!(
                        "expected {} vertices, found {read}",
                        header.vertex_count
                    )));
                }
                if line.trim().is_empty() {
                    continue;
                }
                let vertex = DynamicProperty::parse_from_line(&line, &schema)?;
                push_vertex(&vertex);
                read += 1;
            }
        }
    }

    log::debug!(
        "read {} PLY vertices (normals: {}, colors: {})",
        points.len(),
        !normals.is_empty(),
        !colors.is_empty()
    );

    Ok(PointCloud::new(
        points,
        (!colors.is_empty()).then_some(colors),
        (!normals.is_empty()).then_some(normals),
    ))
}

fn float_schema(names: &[&str]) -> Vec<PlyPropertyDefinition> {
    names
        .iter()
        .map(|name| PlyPropertyDefinition {
            name: name.to_string(),
            data_type: PlyDataType::Float32,
        })
        .collect()
}

/// Write a point cloud as a binary little-endian PLY file.
///
/// Positions are always written as `x y z`; normals are appended as
/// `nx ny nz` when the cloud has them. Colors are not written.
pub fn write_ply_binary(path: impl AsRef<Path>, pointcloud: &PointCloud) -> Result<(), PlyError> {
    let normals = pointcloud.normals();
    if let Some(normals) = normals {
        if normals.len() != pointcloud.len() {
            return Err(PlyError::MismatchedNormals {
                points: pointcloud.len(),
                normals: normals.len(),
            });
        }
    }

    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "ply")?;
    writeln!(writer, "format binary_little_endian 1.0")?;
    writeln!(writer, "element vertex {}", pointcloud.len())?;
    for axis in ["x", "y", "z"] {
        writeln!(writer, "property float {axis}")?;
    }
    if normals.is_some() {
        for axis in ["nx", "ny", "nz"] {
            writeln!(writer, "property float {axis}")?;
        }
    }
    writeln!(writer, "end_header")?;

    let config = bincode::config::standard();
    match normals {
        Some(normals) => {
            for (p, n) in pointcloud.points().iter().zip(normals) {
                let vertex = XYZNormalsProperty {
                    x: p[0] as f32,
                    y: p[1] as f32,
                    z: p[2] as f32,
                    nx: n[0] as f32,
                    ny: n[1] as f32,
                    nz: n[2] as f32,
                };
                bincode::encode_into_std_write(&vertex, &mut writer, config)?;
            }
        }
        None => {
            for p in pointcloud.points() {
                let vertex = XYZProperty {
                    x: p[0] as f32,
                    y: p[1] as f32,
                    z: p[2] as f32,
                };
                bincode::encode_into_std_write(&vertex, &mut writer, config)?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}
