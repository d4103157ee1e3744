//! Attribute values.

use bif_math::{Mat4, Quat, Vec3, Vec4};

/// A typed attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    /// Tokens and strings (`visibility`, `purpose`, ...)
    Token(String),
    Vec3(Vec3),
    Matrix(Mat4),
    IntArray(Vec<i32>),
    Int64Array(Vec<i64>),
    FloatArray(Vec<f32>),
    Vec3Array(Vec<Vec3>),
    Vec4Array(Vec<Vec4>),
    /// Quaternions in `glam` storage order (imaginary first)
    QuatArray(Vec<Quat>),
}

impl Value {
    pub fn as_token(&self) -> Option<&str> {
        match self {
            Value::Token(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i32]> {
        match self {
            Value::IntArray(v) => Some(v),
            _ => None,
        }
    }

    /// Integer arrays of either width, widened to `i64`.
    pub fn to_i64_array(&self) -> Option<Vec<i64>> {
        match self {
            Value::IntArray(v) => Some(v.iter().map(|&i| i as i64).collect()),
            Value::Int64Array(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn as_vec3_array(&self) -> Option<&[Vec3]> {
        match self {
            Value::Vec3Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_quat_array(&self) -> Option<&[Quat]> {
        match self {
            Value::QuatArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<Mat4> {
        match self {
            Value::Matrix(m) => Some(*m),
            _ => None,
        }
    }

    /// Element count for array values, `None` for scalars.
    pub fn array_len(&self) -> Option<usize> {
        match self {
            Value::IntArray(v) => Some(v.len()),
            Value::Int64Array(v) => Some(v.len()),
            Value::FloatArray(v) => Some(v.len()),
            Value::Vec3Array(v) => Some(v.len()),
            Value::Vec4Array(v) => Some(v.len()),
            Value::QuatArray(v) => Some(v.len()),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(token: &str) -> Self {
        Value::Token(token.to_string())
    }
}

impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::IntArray(v)
    }
}

impl From<Vec<Vec3>> for Value {
    fn from(v: Vec<Vec3>) -> Self {
        Value::Vec3Array(v)
    }
}

impl From<Vec<Quat>> for Value {
    fn from(v: Vec<Quat>) -> Self {
        Value::QuatArray(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widen_int_arrays() {
        assert_eq!(Value::IntArray(vec![1, 2]).to_i64_array(), Some(vec![1, 2]));
        assert_eq!(Value::Int64Array(vec![7]).to_i64_array(), Some(vec![7]));
        assert_eq!(Value::Float(1.0).to_i64_array(), None);
    }

    #[test]
    fn test_array_len() {
        assert_eq!(Value::from(vec![Vec3::ZERO; 3]).array_len(), Some(3));
        assert_eq!(Value::from("invisible").array_len(), None);
    }
}
