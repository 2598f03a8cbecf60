use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::errors::AppResult;
use crate::store::{load_hotels, HotelRecord};

const ALL_PROVINCES: &str = "全国";
const ALL_BRANDS: &str = "所有品牌";
const ALL_MODELS: &str = "所有型号";
const PROVINCE_SUFFIX: char = '省';

/// One entry of `data.json`, shaped for the map front-end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelMarker {
    pub hotel_name: Option<String>,
    pub brand: String,
    pub subbrand: Option<String>,
    pub model: Option<String>,
    pub coordinates: String,
    pub supply: Option<i64>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub location: Option<String>,
}

impl From<HotelRecord> for HotelMarker {
    fn from(record: HotelRecord) -> Self {
        let coordinates = format!(
            "{},{}",
            coordinate_text(record.longitude),
            coordinate_text(record.latitude)
        );
        Self {
            hotel_name: record.hotel_name,
            brand: record.brand_name,
            subbrand: record.subbrand_name,
            model: record.tv_model,
            coordinates,
            supply: record.tv_sales,
            province: record.province,
            city: record.city,
            location: record.location,
        }
    }
}

/// Missing sides render as `null` so the front-end's `split(',')` still works.
fn coordinate_text(value: Option<f64>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "null".to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filters {
    pub provinces: Vec<String>,
    pub brands: Vec<String>,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub markers: Vec<HotelMarker>,
    pub filters: Filters,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotFiles {
    pub data_path: PathBuf,
    pub filters_path: PathBuf,
    pub markers: usize,
}

/// Insertion-ordered set of filter values.
struct OrderedValues {
    seen: HashSet<String>,
    values: Vec<String>,
}

impl OrderedValues {
    fn with_sentinel(sentinel: &str) -> Self {
        Self {
            seen: HashSet::new(),
            values: vec![sentinel.to_string()],
        }
    }

    fn push(&mut self, value: Option<&str>) {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            return;
        };
        if self.seen.insert(value.to_string()) {
            self.values.push(value.to_string());
        }
    }
}

pub fn export_snapshot(connection: &Connection) -> AppResult<Snapshot> {
    let records = load_hotels(connection)?;

    let mut provinces = OrderedValues::with_sentinel(ALL_PROVINCES);
    let mut brands = OrderedValues::with_sentinel(ALL_BRANDS);
    let mut models = OrderedValues::with_sentinel(ALL_MODELS);
    for record in &records {
        provinces.push(
            record
                .province
                .as_deref()
                .map(|p| p.strip_suffix(PROVINCE_SUFFIX).unwrap_or(p)),
        );
        brands.push(Some(record.brand_name.as_str()));
        models.push(record.tv_model.as_deref());
    }

    Ok(Snapshot {
        markers: records.into_iter().map(HotelMarker::from).collect(),
        filters: Filters {
            provinces: provinces.values,
            brands: brands.values,
            models: models.values,
        },
    })
}

/// Writes `data.json` and `filters.json` into `out_dir`.
pub fn write_snapshot<P: AsRef<Path>>(
    connection: &Connection,
    out_dir: P,
) -> AppResult<SnapshotFiles> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir)?;
    let snapshot = export_snapshot(connection)?;

    let filters_path = out_dir.join("filters.json");
    fs::write(&filters_path, serde_json::to_string_pretty(&snapshot.filters)?)?;
    info!(target: "export", path = %filters_path.display(), "filters written");

    let data_path = out_dir.join("data.json");
    fs::write(&data_path, serde_json::to_string_pretty(&snapshot.markers)?)?;
    info!(
        target: "export",
        path = %data_path.display(),
        markers = snapshot.markers.len(),
        "hotel data written"
    );

    Ok(SnapshotFiles {
        data_path,
        filters_path,
        markers: snapshot.markers.len(),
    })
}
