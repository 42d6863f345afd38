//! Typed attribute values.

use std::fmt;
use std::sync::Arc;

use strata_core::math::{Vec2, Vec3, Vec4};

/// Interpolation domain of a primvar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpolation {
    /// One value for the whole primitive.
    Constant,
    /// One value per authored face (or curve).
    Uniform,
    /// One value per point, interpolated linearly.
    Varying,
    /// One value per point, interpolated with the surface basis.
    Vertex,
    /// One value per face corner.
    FaceVarying,
}

impl Interpolation {
    pub const ALL: [Interpolation; 5] = [
        Interpolation::Constant,
        Interpolation::Uniform,
        Interpolation::Varying,
        Interpolation::Vertex,
        Interpolation::FaceVarying,
    ];
}

/// Element type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
}

impl ValueType {
    /// Number of scalar components per element.
    pub fn components(self) -> usize {
        match self {
            ValueType::Float | ValueType::Int => 1,
            ValueType::Vec2 => 2,
            ValueType::Vec3 => 3,
            ValueType::Vec4 => 4,
        }
    }

    pub fn is_float(self) -> bool {
        !matches!(self, ValueType::Int)
    }

    pub fn element_size(self) -> usize {
        self.components() * 4
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Float => "float",
            ValueType::Int => "int",
            ValueType::Vec2 => "float2",
            ValueType::Vec3 => "float3",
            ValueType::Vec4 => "float4",
        };
        f.write_str(name)
    }
}

/// An array-valued attribute as pulled from the scene.
///
/// Arrays are reference counted so values move between the scene, buffer
/// sources and samplers without copying.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// No value authored.
    #[default]
    Empty,
    Float(Arc<[f32]>),
    Int(Arc<[i32]>),
    Vec2(Arc<[Vec2]>),
    Vec3(Arc<[Vec3]>),
    Vec4(Arc<[Vec4]>),
}

impl Value {
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Empty => None,
            Value::Float(_) => Some(ValueType::Float),
            Value::Int(_) => Some(ValueType::Int),
            Value::Vec2(_) => Some(ValueType::Vec2),
            Value::Vec3(_) => Some(ValueType::Vec3),
            Value::Vec4(_) => Some(ValueType::Vec4),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Value::Empty => 0,
            Value::Float(v) => v.len(),
            Value::Int(v) => v.len(),
            Value::Vec2(v) => v.len(),
            Value::Vec3(v) => v.len(),
            Value::Vec4(v) => v.len(),
        }
    }

    /// True for [`Value::Empty`] and for zero-length arrays.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_vec3(&self) -> Option<&Arc<[Vec3]>> {
        match self {
            Value::Vec3(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<&Arc<[f32]>> {
        match self {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Raw bytes of the array, as they would be uploaded.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Value::Empty => &[],
            Value::Float(v) => bytemuck::cast_slice(v),
            Value::Int(v) => bytemuck::cast_slice(v),
            Value::Vec2(v) => bytemuck::cast_slice(v),
            Value::Vec3(v) => bytemuck::cast_slice(v),
            Value::Vec4(v) => bytemuck::cast_slice(v),
        }
    }

    /// Element `index` widened to float components, or `None` for integer
    /// data and out-of-range indices.
    pub fn float_components(&self, index: usize) -> Option<[f32; 4]> {
        match self {
            Value::Float(v) => v.get(index).map(|x| [*x, 0.0, 0.0, 0.0]),
            Value::Vec2(v) => v.get(index).map(|x| [x.x, x.y, 0.0, 0.0]),
            Value::Vec3(v) => v.get(index).map(|x| [x.x, x.y, x.z, 0.0]),
            Value::Vec4(v) => v.get(index).map(|x| x.to_array()),
            Value::Empty | Value::Int(_) => None,
        }
    }

    /// Gather elements by index; out-of-range indices read as zero.
    pub fn gather(&self, indices: impl IntoIterator<Item = usize>) -> Value {
        fn pick<T: Copy + Default>(src: &[T], indices: impl IntoIterator<Item = usize>) -> Arc<[T]> {
            indices
                .into_iter()
                .map(|i| src.get(i).copied().unwrap_or_default())
                .collect()
        }
        match self {
            Value::Empty => Value::Empty,
            Value::Float(v) => Value::Float(pick(v, indices)),
            Value::Int(v) => Value::Int(pick(v, indices)),
            Value::Vec2(v) => Value::Vec2(pick(v, indices)),
            Value::Vec3(v) => Value::Vec3(pick(v, indices)),
            Value::Vec4(v) => Value::Vec4(pick(v, indices)),
        }
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::Float(v.into())
    }
}

impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::Int(v.into())
    }
}

impl From<Vec<Vec2>> for Value {
    fn from(v: Vec<Vec2>) -> Self {
        Value::Vec2(v.into())
    }
}

impl From<Vec<Vec3>> for Value {
    fn from(v: Vec<Vec3>) -> Self {
        Value::Vec3(v.into())
    }
}

impl From<Vec<Vec4>> for Value {
    fn from(v: Vec<Vec4>) -> Self {
        Value::Vec4(v.into())
    }
}
