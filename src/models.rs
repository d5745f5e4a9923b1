use serde::{Deserialize, Deserializer, Serialize};

/// One GeoJSON feature as stored in the destination collection.
///
/// Only the members the importer persists are modelled. Unknown keys are
/// ignored, and missing or `null` members fall back to their zero value so
/// that sparse exports still load; a member with the wrong JSON type is a
/// decode error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoFeature {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub geometry: Geometry,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: FeatureProperties,
}

/// Polygon-style geometry: a list of rings, each a list of positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub geometry_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub coordinates: Vec<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    #[serde(default, deserialize_with = "null_as_default")]
    pub release: i64,
    #[serde(
        default,
        alias = "captureDatesRange",
        deserialize_with = "null_as_default"
    )]
    pub capture_dates_range: String,
}

impl GeoFeature {
    /// Number of rings in the geometry.
    pub fn ring_count(&self) -> usize {
        self.geometry.coordinates.len()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
