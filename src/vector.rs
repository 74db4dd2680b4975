//! Point layers read from provider CSV tables and written as GeoJSON.
use crate::bbox::BoundingBox;
use anyhow::{anyhow, Result};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use std::fs;
use std::io::{BufRead, Read};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    pub lon: f64,
    pub lat: f64,
    pub properties: JsonObject,
}

/// WGS84 points carrying every column of their source table as properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointLayer {
    features: Vec<PointFeature>,
}

impl PointLayer {
    /// Read a CSV table after skipping `skip_lines` preamble lines. Numeric
    /// cells become JSON numbers, everything else stays a string.
    pub fn from_csv<R: BufRead>(
        mut reader: R,
        skip_lines: usize,
        lon_column: &str,
        lat_column: &str,
    ) -> Result<Self> {
        let mut line = String::new();
        for _ in 0..skip_lines {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
        }
        Self::from_table(reader, lon_column, lat_column)
    }

    fn from_table<R: Read>(reader: R, lon_column: &str, lat_column: &str) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| anyhow!("Column '{name}' not found in table header {headers:?}"))
        };
        let lon_idx = column(lon_column)?;
        let lat_idx = column(lat_column)?;

        let mut features = vec![];
        let mut rejected = 0_usize;
        for record in csv_reader.records() {
            let record = record?;
            let position = record
                .get(lon_idx)
                .and_then(|v| v.parse::<f64>().ok())
                .zip(record.get(lat_idx).and_then(|v| v.parse::<f64>().ok()));
            let Some((lon, lat)) = position else {
                rejected += 1;
                continue;
            };

            let properties: JsonObject = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), cell_value(v)))
                .collect();
            features.push(PointFeature { lon, lat, properties });
        }
        if rejected > 0 {
            warn!(rejected, "Skipped rows without a valid position");
        }
        Ok(Self { features })
    }

    pub fn from_features(features: Vec<PointFeature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[PointFeature] {
        &self.features
    }

    pub fn append(&mut self, other: PointLayer) {
        self.features.extend(other.features);
    }

    /// Keep the points lying inside the box, boundary excluded.
    pub fn retain_within(&mut self, bbox: &BoundingBox) {
        self.features
            .retain(|f| bbox.strictly_contains(f.lon, f.lat));
    }

    /// Set property `name` on every feature from a function of its properties.
    /// Features for which `f` returns `None` are left untouched.
    pub fn derive_property<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&JsonObject) -> Option<JsonValue>,
    {
        for feature in self.features.iter_mut() {
            if let Some(value) = f(&feature.properties) {
                feature.properties.insert(name.to_string(), value);
            }
        }
    }

    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = self
            .features
            .iter()
            .map(|p| Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![p.lon, p.lat]))),
                id: None,
                properties: Some(p.properties.clone()),
                foreign_members: None,
            })
            .collect();
        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }

    pub fn write_geojson<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(&self.to_feature_collection())?;
        fs::write(path, content)?;
        Ok(())
    }
}

fn cell_value(cell: &str) -> JsonValue {
    if let Ok(i) = cell.parse::<i64>() {
        return JsonValue::from(i);
    }
    match cell.parse::<f64>() {
        Ok(f) if f.is_finite() => JsonValue::from(f),
        _ => JsonValue::from(cell),
    }
}

/// Text form of a property, numbers without decoration.
pub fn property_text(properties: &JsonObject, name: &str) -> Option<String> {
    match properties.get(name)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
