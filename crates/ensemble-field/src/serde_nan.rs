//! Serde helpers that write missing values as `null`.
//!
//! JSON has no NaN, so `#[serde(with = "serde_nan")]` maps `NaN <-> null` for
//! `Vec<f32>` and `#[serde(with = "serde_nan::scalar")]` does the same for a
//! single `f32`.

use serde::{Deserialize, Deserializer, Serializer};

use crate::util::{is_valid, MISSING};

pub fn serialize<S>(values: &[f32], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(values.iter().map(|&v| is_valid(v).then_some(v)))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<Option<f32>>::deserialize(deserializer)?;
    Ok(values.into_iter().map(|v| v.unwrap_or(MISSING)).collect())
}

pub mod scalar {
    use super::*;

    pub fn serialize<S>(value: &f32, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if is_valid(*value) {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f32, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(MISSING))
    }
}
