use super::PlyError;

/// Vertex layouts understood by the PLY reader.
#[derive(Debug, PartialEq, Clone)]
pub enum PlyType {
    /// `x y z` as 32-bit floats.
    XYZ,
    /// `x y z nx ny nz` as 32-bit floats.
    XYZNormals,
    /// `x y z` floats, `red green blue` bytes and `nx ny nz` floats.
    XYZRgbNormals,
    /// Any other vertex schema, decoded property by property.
    Dynamic(Vec<PlyPropertyDefinition>),
}

/// A single vertex property declared in the PLY header.
#[derive(Debug, PartialEq, Clone)]
pub struct PlyPropertyDefinition {
    /// Name of the property, e.g. `x` or `nx`.
    pub name: String,
    /// Scalar type of the property.
    pub data_type: PlyDataType,
}

/// Scalar types of PLY properties.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum PlyDataType {
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// Signed byte.
    Int8,
    /// Unsigned byte.
    UInt8,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
}

impl PlyDataType {
    /// Size in bytes of one value.
    pub fn size(&self) -> usize {
        match self {
            PlyDataType::Float32 | PlyDataType::Int32 | PlyDataType::UInt32 => 4,
            PlyDataType::Float64 => 8,
            PlyDataType::Int16 | PlyDataType::UInt16 => 2,
            PlyDataType::Int8 | PlyDataType::UInt8 => 1,
        }
    }
}

/// Access to the attributes of a decoded vertex.
pub trait PlyPropertyTrait {
    /// Position of the vertex.
    fn to_point(&self) -> [f64; 3];
    /// Color of the vertex, black when absent.
    fn to_color(&self) -> [u8; 3];
    /// Normal of the vertex, zero when absent.
    fn to_normal(&self) -> [f64; 3];
}

/// Vertex with position only.
#[derive(Debug, bincode::Encode, bincode::Decode)]
pub struct XYZProperty {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
}

impl PlyPropertyTrait for XYZProperty {
    fn to_point(&self) -> [f64; 3] {
        [self.x as f64, self.y as f64, self.z as f64]
    }

    fn to_color(&self) -> [u8; 3] {
        [0, 0, 0]
    }

    fn to_normal(&self) -> [f64; 3] {
        [0.0, 0.0, 0.0]
    }
}

/// Vertex with position and normal.
#[derive(Debug, bincode::Encode, bincode::Decode)]
pub struct XYZNormalsProperty {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
    /// Normal X component.
    pub nx: f32,
    /// Normal Y component.
    pub ny: f32,
    /// Normal Z component.
    pub nz: f32,
}

impl PlyPropertyTrait for XYZNormalsProperty {
    fn to_point(&self) -> [f64; 3] {
        [self.x as f64, self.y as f64, self.z as f64]
    }

    fn to_color(&self) -> [u8; 3] {
        [0, 0, 0]
    }

    fn to_normal(&self) -> [f64; 3] {
        [self.nx as f64, self.ny as f64, self.nz as f64]
    }
}

/// Vertex with position, color and normal.
#[derive(Debug, bincode::Decode)]
pub struct XYZRgbNormalsProperty {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
    /// Red channel.
    pub red: u8,
    /// Green channel.
    pub green: u8,
    /// Blue channel.
    pub blue: u8,
    /// Normal X component.
    pub nx: f32,
    /// Normal Y component.
    pub ny: f32,
    /// Normal Z component.
    pub nz: f32,
}

impl PlyPropertyTrait for XYZRgbNormalsProperty {
    fn to_point(&self) -> [f64; 3] {
        [self.x as f64, self.y as f64, self.z as f64]
    }

    fn to_color(&self) -> [u8; 3] {
        [self.red, self.green, self.blue]
    }

    fn to_normal(&self) -> [f64; 3] {
        [self.nx as f64, self.ny as f64, self.nz as f64]
    }
}

/// Vertex decoded against an arbitrary schema.
#[derive(Debug)]
pub struct DynamicProperty {
    /// Property names and values in declaration order.
    pub properties: Vec<(String, f64)>,
}

fn le_bytes<const N: usize>(buffer: &[u8], offset: usize) -> Result<[u8; N], PlyError> {
    buffer
        .get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(PlyError::UnsupportedProperty)
}

impl DynamicProperty {
    /// Decode one binary little-endian vertex record.
    pub fn parse_from_buffer(
        buffer: &[u8],
        schema: &[PlyPropertyDefinition],
    ) -> Result<Self, PlyError> {
        let mut properties = Vec::with_capacity(schema.len());
        let mut offset = 0;

        for prop_def in schema {
            let value = match prop_def.data_type {
                PlyDataType::Float32 => f32::from_le_bytes(le_bytes(buffer, offset)?) as f64,
                PlyDataType::Float64 => f64::from_le_bytes(le_bytes(buffer, offset)?),
                PlyDataType::Int8 => i8::from_le_bytes(le_bytes(buffer, offset)?) as f64,
                PlyDataType::UInt8 => u8::from_le_bytes(le_bytes(buffer, offset)?) as f64,
                PlyDataType::Int16 => i16::from_le_bytes(le_bytes(buffer, offset)?) as f64,
                PlyDataType::UInt16 => u16::from_le_bytes(le_bytes(buffer, offset)?) as f64,
                PlyDataType::Int32 => i32::from_le_bytes(le_bytes(buffer, offset)?) as f64,
                PlyDataType::UInt32 => u32::from_le_bytes(le_bytes(buffer, offset)?) as f64,
            };
            properties.push((prop_def.name.clone(), value));
            offset += prop_def.data_type.size();
        }

        Ok(DynamicProperty { properties })
    }

    /// Decode one ASCII vertex line.
    pub fn parse_from_line(line: &str, schema: &[PlyPropertyDefinition]) -> Result<Self, PlyError> {
        let mut tokens = line.split_whitespace();
        let properties = schema
            .iter()
            .map(|prop_def| {
                let value = tokens
                    .next()
                    .and_then(|t| t.parse::<f64>().ok())
                    .ok_or_else(|| {
                        PlyError::MalformedHeader(format!("missing value for {}", prop_def.name))
                    })?;
                Ok((prop_def.name.clone(), value))
            })
            .collect::<Result<Vec<_>, PlyError>>()?;
        Ok(DynamicProperty { properties })
    }

    fn get(&self, name: &str) -> Option<f64> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

impl PlyPropertyTrait for DynamicProperty {
    fn to_point(&self) -> [f64; 3] {
        ["x", "y", "z"].map(|n| self.get(n).unwrap_or(0.0))
    }

    fn to_color(&self) -> [u8; 3] {
        ["red", "green", "blue"].map(|n| self.get(n).unwrap_or(0.0).clamp(0.0, 255.0) as u8)
    }

    fn to_normal(&self) -> [f64; 3] {
        ["nx", "ny", "nz"].map(|n| self.get(n).unwrap_or(0.0))
    }
}

/// A decoded vertex.
pub enum PlyProperty {
    /// Position only.
    XYZ(XYZProperty),
    /// Position and normal.
    XYZNormals(XYZNormalsProperty),
    /// Position, color and normal.
    XYZRgbNormals(XYZRgbNormalsProperty),
    /// Arbitrary schema.
    Dynamic(DynamicProperty),
}

const XYZ_NAMES: [&str; 3] = ["x", "y", "z"];
const XYZ_NORMALS_NAMES: [&str; 6] = ["x", "y", "z", "nx", "ny", "nz"];
const XYZ_RGB_NORMALS_NAMES: [&str; 9] = ["x", "y", "z", "red", "green", "blue", "nx", "ny", "nz"];

fn matches_layout(
    properties: &[PlyPropertyDefinition],
    names: &[&str],
    is_color: impl Fn(&str) -> bool,
) -> bool {
    properties.len() == names.len()
        && properties.iter().zip(names).all(|(p, expected)| {
            let expected_type = if is_color(expected) {
                PlyDataType::UInt8
            } else {
                PlyDataType::Float32
            };
            p.name == *expected && p.data_type == expected_type
        })
}

impl PlyType {
    /// Decode one binary little-endian vertex record of this layout.
    pub fn deserialize(&self, buffer: &[u8]) -> Result<PlyProperty, PlyError> {
        let config = bincode::config::standard();
        match self {
            PlyType::XYZ => {
                let (property, _): (XYZProperty, usize) =
                    bincode::decode_from_slice(buffer, config)?;
                Ok(PlyProperty::XYZ(property))
            }
            PlyType::XYZNormals => {
                let (property, _): (XYZNormalsProperty, usize) =
                    bincode::decode_from_slice(buffer, config)?;
                Ok(PlyProperty::XYZNormals(property))
            }
            PlyType::XYZRgbNormals => {
                let (property, _): (XYZRgbNormalsProperty, usize) =
                    bincode::decode_from_slice(buffer, config)?;
                Ok(PlyProperty::XYZRgbNormals(property))
            }
            PlyType::Dynamic(ref schema) => Ok(PlyProperty::Dynamic(
                DynamicProperty::parse_from_buffer(buffer, schema)?,
            )),
        }
    }

    /// Size in bytes of one binary vertex record.
    pub fn size_of(&self) -> usize {
        match self {
            PlyType::XYZ => 3 * 4,
            PlyType::XYZNormals => 6 * 4,
            PlyType::XYZRgbNormals => 6 * 4 + 3,
            PlyType::Dynamic(ref props) => props.iter().map(|p| p.data_type.size()).sum(),
        }
    }

    /// Pick the fixed layout matching the header properties, or a dynamic one.
    pub fn detect_format(properties: &[PlyPropertyDefinition]) -> Result<Self, PlyError> {
        if !XYZ_NAMES
            .iter()
            .all(|n| properties.iter().any(|p| p.name == *n))
        {
            return Err(PlyError::UnsupportedProperty);
        }

        let is_color = |n: &str| matches!(n, "red" | "green" | "blue");
        if matches_layout(properties, &XYZ_NAMES, is_color) {
            return Ok(PlyType::XYZ);
        }
        if matches_layout(properties, &XYZ_NORMALS_NAMES, is_color) {
            return Ok(PlyType::XYZNormals);
        }
        if matches_layout(properties, &XYZ_RGB_NORMALS_NAMES, is_color) {
            return Ok(PlyType::XYZRgbNormals);
        }

        Ok(PlyType::Dynamic(properties.to_vec()))
    }

    /// Check if the layout carries `nx ny nz`.
    pub fn has_normals(&self) -> bool {
        match self {
            PlyType::XYZ => false,
            PlyType::XYZNormals | PlyType::XYZRgbNormals => true,
            PlyType::Dynamic(props) => ["nx", "ny", "nz"]
                .iter()
                .all(|n| props.iter().any(|p| p.name == *n)),
        }
    }

    /// Check if the layout carries `red green blue`.
    pub fn has_colors(&self) -> bool {
        match self {
            PlyType::XYZ | PlyType::XYZNormals => false,
            PlyType::XYZRgbNormals => true,
            PlyType::Dynamic(props) => ["red", "green", "blue"]
                .iter()
                .all(|n| props.iter().any(|p| p.name == *n)),
        }
    }
}

impl PlyPropertyTrait for PlyProperty {
    fn to_point(&self) -> [f64; 3] {
        match self {
            PlyProperty::XYZ(property) => property.to_point(),
            PlyProperty::XYZNormals(property) => property.to_point(),
            PlyProperty::XYZRgbNormals(property) => property.to_point(),
            PlyProperty::Dynamic(property) => property.to_point(),
        }
    }

    fn to_color(&self) -> [u8; 3] {
        match self {
            PlyProperty::XYZ(property) => property.to_color(),
            PlyProperty::XYZNormals(property) => property.to_color(),
            PlyProperty::XYZRgbNormals(property) => property.to_color(),
            PlyProperty::Dynamic(property) => property.to_color(),
        }
    }

    fn to_normal(&self) -> [f64; 3] {
        match self {
            PlyProperty::XYZ(property) => property.to_normal(),
            PlyProperty::XYZNormals(property) => property.to_normal(),
            PlyProperty::XYZRgbNormals(property) => property.to_normal(),
            PlyProperty::Dynamic(property) => property.to_normal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs(names: &[(&str, PlyDataType)]) -> Vec<PlyPropertyDefinition> {
        names
            .iter()
            .map(|(name, data_type)| PlyPropertyDefinition {
                name: name.to_string(),
                data_type: *data_type,
            })
            .collect()
    }

    #[test]
    fn test_detect_fixed_layouts() -> Result<(), PlyError> {
        let f = PlyDataType::Float32;
        let xyz = defs(&[("x", f), ("y", f), ("z", f)]);
        assert_eq!(PlyType::detect_format(&xyz)?, PlyType::XYZ);

        let xyzn = defs(&[("x", f), ("y", f), ("z", f), ("nx", f), ("ny", f), ("nz", f)]);
        let layout = PlyType::detect_format(&xyzn)?;
        assert_eq!(layout, PlyType::XYZNormals);
        assert!(layout.has_normals());
        assert!(!layout.has_colors());
        assert_eq!(layout.size_of(), 24);
        Ok(())
    }

    #[test]
    fn test_detect_double_precision_is_dynamic() -> Result<(), PlyError> {
        let d = PlyDataType::Float64;
        let props = defs(&[("x", d), ("y", d), ("z", d)]);
        let layout = PlyType::detect_format(&props)?;
        assert!(matches!(layout, PlyType::Dynamic(_)));
        assert_eq!(layout.size_of(), 24);
        Ok(())
    }

    #[test]
    fn test_detect_requires_position() {
        let props = defs(&[("intensity", PlyDataType::Float32)]);
        assert!(PlyType::detect_format(&props).is_err());
    }

    #[test]
    fn test_dynamic_property_from_buffer() -> Result<(), PlyError> {
        let props = defs(&[
            ("x", PlyDataType::Float64),
            ("y", PlyDataType::Float32),
            ("z", PlyDataType::Float32),
            ("red", PlyDataType::UInt8),
        ]);
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&1.5f64.to_le_bytes());
        buffer.extend_from_slice(&2.0f32.to_le_bytes());
        buffer.extend_from_slice(&(-3.0f32).to_le_bytes());
        buffer.push(200);

        let vertex = DynamicProperty::parse_from_buffer(&buffer, &props)?;
        assert_eq!(vertex.to_point(), [1.5, 2.0, -3.0]);
        assert_eq!(vertex.to_color(), [200, 0, 0]);
        assert_eq!(vertex.to_normal(), [0.0, 0.0, 0.0]);

        assert!(DynamicProperty::parse_from_buffer(&buffer[..10], &props).is_err());
        Ok(())
    }

    #[test]
    fn test_dynamic_property_from_line() -> Result<(), PlyError> {
        let f = PlyDataType::Float32;
        let props = defs(&[("x", f), ("y", f), ("z", f)]);
        let vertex = DynamicProperty::parse_from_line("0.5 -1 2e-1", &props)?;
        assert_eq!(vertex.to_point(), [0.5, -1.0, 0.2]);
        assert!(DynamicProperty::parse_from_line("0.5 -1", &props).is_err());
        Ok(())
    }
}
