use std::collections::HashMap;
use std::io::{BufRead, Read};
use std::path::Path;

use crate::pointcloud::PointCloud;

const MAX_POINT_STEP: usize = 1024;
const MAX_POINTS: usize = 50_000_000;

/// Error types for the PCD module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PcdError {
    /// Failed to read PCD file
    #[error("Failed to read PCD file")]
    Io(#[from] std::io::Error),

    /// Unsupported field layout or data encoding
    #[error("Unsupported PCD header: {0}")]
    Unsupported(String),

    /// Malformed PCD header or body
    #[error("Malformed PCD file: {0}")]
    Malformed(String),

    /// Invalid PCD file extension
    #[error("Invalid PCD file extension. Got:{0}")]
    InvalidFileExtension(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PcdEncoding {
    Binary,
    Ascii,
}

#[derive(Debug)]
struct PcdField {
    // byte offset within a binary record
    offset: usize,
    // column of the first element within an ascii record
    column: usize,
    size: usize,
    count: usize,
    kind: char,
}

#[derive(Debug)]
struct PcdLayout {
    fields: HashMap<String, PcdField>,
    point_step: usize,
    num_points: usize,
    encoding: PcdEncoding,
}

impl PcdLayout {
    fn field(&self, names: &[&str]) -> Option<&PcdField> {
        names.iter().find_map(|n| self.fields.get(*n))
    }
}

fn read_f32(buf: &[u8], offset: usize) -> Result<f32, PcdError> {
    let bytes = buf
        .get(offset..offset + 4)
        .and_then(|s| <[u8; 4]>::try_from(s).ok())
        .ok_or_else(|| PcdError::Malformed(format!("record too short for offset {offset}")))?;
    Ok(f32::from_le_bytes(bytes))
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, PcdError> {
    read_f32(buf, offset).map(f32::to_bits)
}

fn parse_list<T: std::str::FromStr>(
    it: std::str::SplitWhitespace<'_>,
    key: &str,
) -> Result<Vec<T>, PcdError> {
    it.map(|v| {
        v.parse::<T>()
            .map_err(|_| PcdError::Malformed(format!("invalid {key} entry '{v}'")))
    })
    .collect()
}

fn parse_pcd_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, PcdError> {
    let mut field_names: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut types: Vec<char> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut num_points = None;
    let mut line = String::new();

    let encoding = loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PcdError::Malformed("missing DATA line".into()));
        }
        let trimmed = line.trim();
        if trimmed.starts_with('#') || trimmed.is_empty() {
            continue;
        }

        let mut it = trimmed.split_whitespace();
        match it.next() {
            Some("FIELDS") => field_names = it.map(String::from).collect(),
            Some("SIZE") => sizes = parse_list(it, "SIZE")?,
            Some("COUNT") => counts = parse_list(it, "COUNT")?,
            Some("TYPE") => {
                types = it
                    .map(|v| v.chars().next().unwrap_or('?'))
                    .collect::<Vec<_>>()
            }
            Some("POINTS") => num_points = parse_list::<usize>(it, "POINTS")?.first().copied(),
            Some("DATA") => match it.next() {
                Some("binary") => break PcdEncoding::Binary,
                Some("ascii") => break PcdEncoding::Ascii,
                other => {
                    return Err(PcdError::Unsupported(format!(
                        "DATA {}",
                        other.unwrap_or_default()
                    )))
                }
            },
            _ => {}
        }
    };

    if field_names.is_empty()
        || sizes.len() != field_names.len()
        || types.len() != field_names.len()
        || (!counts.is_empty() && counts.len() != field_names.len())
    {
        return Err(PcdError::Malformed(
            "FIELDS, SIZE, TYPE and COUNT disagree".into(),
        ));
    }

    let mut offset = 0usize;
    let mut column = 0usize;
    let mut fields = HashMap::new();

    for (i, name) in field_names.iter().enumerate() {
        let count = counts.get(i).copied().unwrap_or(1);
        let field = PcdField {
            offset,
            column,
            size: sizes[i],
            count,
            kind: types[i],
        };

        let is_float_scalar = field.size == 4 && field.count == 1 && field.kind == 'F';
        match name.as_str() {
            "x" | "y" | "z" | "normal_x" | "normal_y" | "normal_z" | "nx" | "ny" | "nz"
                if !is_float_scalar =>
            {
                return Err(PcdError::Unsupported(format!(
                    "field {name} must be a single 4-byte float"
                )));
            }
            "rgb" | "rgba" if !(field.size == 4 && field.count == 1) => {
                return Err(PcdError::Unsupported(format!(
                    "field {name} must be a packed 4-byte value"
                )));
            }
            _ => {}
        }

        offset = field
            .size
            .checked_mul(field.count)
            .and_then(|bytes| offset.checked_add(bytes))
            .filter(|&o| o <= MAX_POINT_STEP)
            .ok_or_else(|| PcdError::Malformed("point record too large".into()))?;
        column += count;

        if fields.insert(name.clone(), field).is_some() {
            return Err(PcdError::Malformed(format!("duplicate field {name}")));
        }
    }

    let num_points = num_points.ok_or_else(|| PcdError::Malformed("missing POINTS".into()))?;

    Ok(PcdLayout {
        fields,
        point_step: offset,
        num_points,
        encoding,
    })
}

fn unpack_rgb(rgb: u32) -> [u8; 3] {
    [
        ((rgb >> 16) & 0xFF) as u8,
        ((rgb >> 8) & 0xFF) as u8,
        (rgb & 0xFF) as u8,
    ]
}

/// Read a PCD file with binary or ASCII data.
///
/// Returns a [`PointCloud`] with positions and, when present, packed `rgb`
/// colors and normals (`normal_x`/`nx` naming).
pub fn read_pcd(path: impl AsRef<Path>) -> Result<PointCloud, PcdError> {
    let Some(file_ext) = path.as_ref().extension() else {
        return Err(PcdError::InvalidFileExtension("".into()));
    };

    if file_ext != "pcd" {
        return Err(PcdError::InvalidFileExtension(
            file_ext.to_string_lossy().to_string(),
        ));
    }

    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let layout = parse_pcd_layout(&mut reader)?;

    if layout.num_points > MAX_POINTS {
        return Err(PcdError::Malformed(format!(
            "{} points exceeds the supported maximum",
            layout.num_points
        )));
    }

    let missing = |name: &str| PcdError::Unsupported(format!("missing field {name}"));
    let fx = layout.field(&["x"]).ok_or_else(|| missing("x"))?;
    let fy = layout.field(&["y"]).ok_or_else(|| missing("y"))?;
    let fz = layout.field(&["z"]).ok_or_else(|| missing("z"))?;

    let frgb = layout.field(&["rgb", "rgba"]);
    let fnormals = match (
        layout.field(&["normal_x", "nx"]),
        layout.field(&["normal_y", "ny"]),
        layout.field(&["normal_z", "nz"]),
    ) {
        (Some(nx), Some(ny), Some(nz)) => Some([nx, ny, nz]),
        _ => None,
    };

    let mut points = Vec::with_capacity(layout.num_points);
    let mut colors = Vec::new();
    let mut normals = Vec::new();

    match layout.encoding {
        PcdEncoding::Binary => {
            if layout.point_step == 0 {
                return Err(PcdError::Malformed("empty point record".into()));
            }
            let mut buffer = vec![0u8; layout.point_step];
            for _ in 0..layout.num_points {
                reader.read_exact(&mut buffer)?;

                let x = read_f32(&buffer, fx.offset)?;
                let y = read_f32(&buffer, fy.offset)?;
                let z = read_f32(&buffer, fz.offset)?;
                points.push([x as f64, y as f64, z as f64]);

                if let Some(f) = frgb {
                    colors.push(unpack_rgb(read_u32(&buffer, f.offset)?));
                }
                if let Some([nx, ny, nz]) = fnormals {
                    normals.push([
                        read_f32(&buffer, nx.offset)? as f64,
                        read_f32(&buffer, ny.offset)? as f64,
                        read_f32(&buffer, nz.offset)? as f64,
                    ]);
                }
            }
        }
        PcdEncoding::Ascii => {
            let mut line = String::new();
            while points.len() < layout.num_points {
                line.clear();
                if reader.read_line(&mut line)? == 0 {
                    return Err(PcdError::Malformed(format!(
                        "expected {} points, found {}",
                        layout.num_points,
                        points.len()
                    )));
                }
                let tokens = line.split_whitespace().collect::<Vec<_>>();
                if tokens.is_empty() {
                    continue;
                }
                let value = |f: &PcdField| -> Result<f64, PcdError> {
                    tokens
                        .get(f.column)
                        .and_then(|t| t.parse::<f64>().ok())
                        .ok_or_else(|| PcdError::Malformed(format!("bad record '{}'", line.trim())))
                };

                points.push([value(fx)?, value(fy)?, value(fz)?]);
                if let Some(f) = frgb {
                    // packed colors are stored as the float with the same bits
                    let packed = value(f)?;
                    let rgb = if f.kind == 'F' {
                        (packed as f32).to_bits()
                    } else {
                        packed as u32
                    };
                    colors.push(unpack_rgb(rgb));
                }
                if let Some([nx, ny, nz]) = fnormals {
                    normals.push([value(nx)?, value(ny)?, value(nz)?]);
                }
            }
        }
    }

    log::debug!("read {} PCD points", points.len());

    Ok(PointCloud::new(
        points,
        (!colors.is_empty()).then_some(colors),
        (!normals.is_empty()).then_some(normals),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn test_parses_binary_header() -> Result<(), PcdError> {
        let data = b"# .PCD v0.7\nVERSION 0.7\nFIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nCOUNT 1 1 1\nWIDTH 10\nHEIGHT 1\nPOINTS 10\nDATA binary\n";
        let layout = parse_pcd_layout(&mut Cursor::new(&data[..]))?;
        assert_eq!(layout.num_points, 10);
        assert_eq!(layout.point_step, 12);
        assert_eq!(layout.encoding, PcdEncoding::Binary);
        assert_eq!(layout.fields.get("z").map(|f| f.offset), Some(8));
        Ok(())
    }

    #[test]
    fn test_rejects_compressed_data() {
        let data = b"FIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nPOINTS 1\nDATA binary_compressed\n";
        assert!(matches!(
            parse_pcd_layout(&mut Cursor::new(&data[..])),
            Err(PcdError::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_type_for_xyz() {
        let data = b"FIELDS x y z\nSIZE 4 4 4\nTYPE I I I\nCOUNT 1 1 1\nPOINTS 5\nDATA binary\n";
        assert!(parse_pcd_layout(&mut Cursor::new(&data[..])).is_err());
    }

    #[test]
    fn test_read_binary_with_normals() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::Builder::new().suffix(".pcd").tempfile()?;
        let header = "FIELDS x y z normal_x normal_y normal_z\nSIZE 4 4 4 4 4 4\nTYPE F F F F F F\nCOUNT 1 1 1 1 1 1\nPOINTS 2\nDATA binary\n";
        file.write_all(header.as_bytes())?;
        for v in [0.1f32, 0.2, 0.5, 0.0, 0.0, -1.0, 0.3, 0.2, 0.5, 0.0, -1.0, 0.0] {
            file.write_all(&v.to_le_bytes())?;
        }
        file.flush()?;

        let cloud = read_pcd(file.path())?;
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.points()[1][0], 0.3f32 as f64);
        assert_eq!(cloud.normals().map(|n| n[1]), Some([0.0, -1.0, 0.0]));
        assert!(cloud.colors().is_none());
        Ok(())
    }

    #[test]
    fn test_read_ascii_with_rgb() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::Builder::new().suffix(".pcd").tempfile()?;
        let rgb = f32::from_bits(0x00FF8000);
        let content = format!(
            "FIELDS x y z rgb\nSIZE 4 4 4 4\nTYPE F F F U\nCOUNT 1 1 1 1\nPOINTS 1\nDATA ascii\n1.0 2.0 3.0 {}\n",
            rgb.to_bits()
        );
        file.write_all(content.as_bytes())?;
        file.flush()?;

        let cloud = read_pcd(file.path())?;
        assert_eq!(cloud.points(), &[[1.0, 2.0, 3.0]]);
        assert_eq!(cloud.colors().map(|c| c[0]), Some([255, 128, 0]));
        Ok(())
    }

    #[test]
    fn test_rejects_extension() {
        assert!(matches!(
            read_pcd("cloud.ply"),
            Err(PcdError::InvalidFileExtension(_))
        ));
    }
}
