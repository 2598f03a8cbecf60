use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::geocoder::Geocoder;
use crate::normalize::{RowNormalizer, SheetLayout};
use crate::sheets::{read_workbook, Sheet};
use crate::store::{insert_hotel, open_store, HotelRecord};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SheetReport {
    pub sheet: String,
    pub column_offset: usize,
    pub rows_seen: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub blank_rows: usize,
    pub geocode_misses: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sheets: Vec<SheetReport>,
}

impl ImportReport {
    pub fn inserted(&self) -> usize {
        self.sheets.iter().map(|s| s.inserted).sum()
    }

    pub fn duplicates(&self) -> usize {
        self.sheets.iter().map(|s| s.duplicates).sum()
    }

    pub fn geocode_misses(&self) -> usize {
        self.sheets.iter().map(|s| s.geocode_misses).sum()
    }
}

/// Sheet selection and layout rules for one import run.
#[derive(Debug, Clone, Default)]
pub struct SheetPlan {
    pub only: Option<Vec<String>>,
    pub subbrand_sheets: Vec<String>,
    pub header_rows: usize,
}

impl SheetPlan {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            only: config.import_sheets.clone(),
            subbrand_sheets: config.subbrand_sheets.clone(),
            header_rows: config.header_rows,
        }
    }

    pub fn includes(&self, sheet: &str) -> bool {
        self.only
            .as_ref()
            .map(|names| names.iter().any(|name| name == sheet))
            .unwrap_or(true)
    }

    /// Requested sheet names that match none of `sheet_names`.
    pub fn unmatched<'a>(&'a self, sheet_names: &[&str]) -> Vec<&'a str> {
        self.only
            .iter()
            .flatten()
            .map(String::as_str)
            .filter(|name| !sheet_names.contains(name))
            .collect()
    }

    pub fn layout_for(&self, sheet: &str) -> SheetLayout {
        if self.subbrand_sheets.iter().any(|name| name == sheet) {
            SheetLayout::with_subbrand(self.header_rows)
        } else {
            SheetLayout::standard(self.header_rows)
        }
    }
}

pub struct ImportPipeline {
    database_path: PathBuf,
    plan: SheetPlan,
    geocoder: Geocoder,
    row_pause: Duration,
}

impl ImportPipeline {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        Ok(Self::with_geocoder(config, Geocoder::new(config)?))
    }

    pub fn with_geocoder(config: &AppConfig, geocoder: Geocoder) -> Self {
        Self {
            database_path: config.database_path.clone(),
            plan: SheetPlan::from_config(config),
            geocoder,
            row_pause: config.row_pause(),
        }
    }

    /// Reads the workbook and imports every selected sheet in document order.
    pub async fn run<P: AsRef<Path>>(&self, spreadsheet: P) -> AppResult<ImportReport> {
        let spreadsheet = spreadsheet.as_ref();
        let started_at = Utc::now();
        let sheets = read_workbook(spreadsheet)?;

        let names = sheets.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
        for missing in self.plan.unmatched(&names) {
            warn!(sheet = missing, available = ?names, "requested sheet not found in workbook");
        }

        let mut reports = Vec::new();
        for sheet in &sheets {
            if !self.plan.includes(&sheet.name) {
                debug!(sheet = %sheet.name, "sheet not selected; skipping");
                continue;
            }
            reports.push(self.import_sheet(sheet).await?);
        }

        Ok(ImportReport {
            source: spreadsheet.display().to_string(),
            started_at,
            finished_at: Utc::now(),
            sheets: reports,
        })
    }

    pub async fn import_sheet(&self, sheet: &Sheet) -> AppResult<SheetReport> {
        let layout = self.plan.layout_for(&sheet.name);
        info!(
            sheet = %sheet.name,
            column_offset = layout.column_offset,
            rows = sheet.rows.len(),
            "importing sheet"
        );

        let connection = open_store(&self.database_path)?;
        let mut normalizer = RowNormalizer::new(sheet.name.clone(), layout);
        let mut report = SheetReport {
            sheet: sheet.name.clone(),
            column_offset: layout.column_offset,
            ..SheetReport::default()
        };

        for (index, cells) in sheet.rows.iter().enumerate().skip(layout.header_rows) {
            report.rows_seen += 1;
            let Some(row) = normalizer.normalize(cells) else {
                report.blank_rows += 1;
                continue;
            };

            let coordinates = self.geocoder.resolve(row.location.as_deref()).await;
            if coordinates.is_none() {
                report.geocode_misses += 1;
            }

            let record = HotelRecord::from_row(row, coordinates);
            if insert_hotel(&connection, &record)? {
                report.inserted += 1;
            } else {
                report.duplicates += 1;
            }
            debug!(sheet = %sheet.name, row = index + 1, "row processed");

            if !self.row_pause.is_zero() {
                sleep(self.row_pause).await;
            }
        }
        drop(connection);

        info!(
            sheet = %report.sheet,
            inserted = report.inserted,
            duplicates = report.duplicates,
            geocode_misses = report.geocode_misses,
            "sheet imported"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tempfile::tempdir;

    use super::*;
    use crate::errors::AppError;
    use crate::geocoder::{Coordinates, GeocodeLookup, RetryPolicy};
    use crate::sheets::RawCell;
    use crate::store::load_hotels;

    struct CountingLookup {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl GeocodeLookup for CountingLookup {
        async fn lookup(&self, _address: &str) -> AppResult<Coordinates> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AppError::Geocode {
                    status: 2,
                    message: "bad request".into(),
                })
            } else {
                Ok(Coordinates {
                    lat: 30.0,
                    lng: 120.0,
                })
            }
        }
    }

    fn test_config(dir: &Path) -> AppConfig {
        AppConfig {
            spreadsheet_path: dir.join("hotels.xlsx"),
            database_path: dir.join("hotels.db"),
            export_dir: dir.to_path_buf(),
            baidu_api_key: None,
            geocoder_endpoint: "http://127.0.0.1:9/".into(),
            geocoder_timeout_secs: 1,
            geocoder_max_attempts: 3,
            geocoder_retry_delay_ms: 0,
            row_pause_ms: 0,
            header_rows: 1,
            import_sheets: None,
            subbrand_sheets: vec!["华住".into()],
        }
    }

    fn cells(values: &[&str]) -> Vec<RawCell> {
        values
            .iter()
            .map(|v| {
                if v.is_empty() {
                    RawCell::Blank
                } else {
                    RawCell::Text(v.to_string())
                }
            })
            .collect()
    }

    fn sample_sheet() -> Sheet {
        Sheet::new(
            "全季",
            vec![
                cells(&["省份", "城市", "酒店", "型号", "数量", "地址"]),
                cells(&["浙江省", "杭州", "西湖店", "55E3", "10", "杭州市西湖区"]),
                cells(&["", "", "", "65E3", "4", ""]),
                cells(&["", "", "", "", "", ""]),
            ],
        )
    }

    #[test]
    fn plan_selects_sheets_and_layouts() {
        let plan = SheetPlan {
            only: Some(vec!["朵兰达".into()]),
            subbrand_sheets: vec!["华住".into()],
            header_rows: 2,
        };
        assert!(plan.includes("朵兰达"));
        assert!(!plan.includes("全季"));
        assert_eq!(plan.layout_for("华住").column_offset, 1);
        assert_eq!(plan.layout_for("朵兰达"), SheetLayout::standard(2));
        assert!(SheetPlan::default().includes("anything"));
    }

    #[test]
    fn plan_reports_requested_sheets_that_are_absent() {
        let plan = SheetPlan {
            only: Some(vec!["朵兰达".into(), "全季".into()]),
            ..SheetPlan::default()
        };
        assert_eq!(plan.unmatched(&["全季", "华住"]), vec!["朵兰达"]);
        assert!(plan.unmatched(&["朵兰达", "全季"]).is_empty());
        assert!(SheetPlan::default().unmatched(&[]).is_empty());
    }

    #[tokio::test]
    async fn pauses_after_each_persisted_row() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.row_pause_ms = 40;
        let pipeline = ImportPipeline::with_geocoder(&config, Geocoder::disabled());

        let started = std::time::Instant::now();
        let report = pipeline.import_sheet(&sample_sheet()).await.unwrap();
        assert_eq!(report.inserted, 2);
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn blank_rows_do_not_pause() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.row_pause_ms = 50;
        let pipeline = ImportPipeline::with_geocoder(&config, Geocoder::disabled());

        let mut rows = vec![
            cells(&["省份", "城市", "酒店", "型号", "数量", "地址"]),
            cells(&["浙江省", "杭州", "西湖店", "55E3", "10", "杭州市西湖区"]),
        ];
        rows.extend((0..40).map(|_| cells(&["", "", "", "", "", ""])));
        let sheet = Sheet::new("全季", rows);

        let started = std::time::Instant::now();
        let report = pipeline.import_sheet(&sheet).await.unwrap();
        let elapsed = started.elapsed();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.blank_rows, 40);
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(40 * 50));
    }

    #[tokio::test]
    async fn imports_sheet_rows_with_coordinates() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let lookup = Arc::new(CountingLookup {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let pipeline = ImportPipeline::with_geocoder(
            &config,
            Geocoder::from_lookup(lookup.clone(), RetryPolicy::new(3, Duration::ZERO)),
        );

        let report = pipeline.import_sheet(&sample_sheet()).await.unwrap();
        assert_eq!(report.rows_seen, 3);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.blank_rows, 1);
        assert_eq!(report.geocode_misses, 0);
        // identical addresses are looked up again
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);

        let conn = open_store(&config.database_path).unwrap();
        let rows = load_hotels(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].hotel_name.as_deref(), Some("西湖店"));
        assert_eq!(rows[1].location.as_deref(), Some("杭州市西湖区"));
        assert_eq!(rows[1].latitude, Some(30.0));
        assert_eq!(rows[1].brand_name, "全季");
    }

    #[tokio::test]
    async fn failed_geocoding_still_persists_rows() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let lookup = Arc::new(CountingLookup {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let pipeline = ImportPipeline::with_geocoder(
            &config,
            Geocoder::from_lookup(lookup.clone(), RetryPolicy::new(3, Duration::ZERO)),
        );

        let report = pipeline.import_sheet(&sample_sheet()).await.unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.geocode_misses, 2);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 6);

        let conn = open_store(&config.database_path).unwrap();
        let rows = load_hotels(&conn).unwrap();
        assert!(rows
            .iter()
            .all(|r| r.latitude.is_none() && r.longitude.is_none()));
    }

    #[tokio::test]
    async fn rerunning_a_sheet_adds_nothing() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let pipeline = ImportPipeline::with_geocoder(&config, Geocoder::disabled());

        let first = pipeline.import_sheet(&sample_sheet()).await.unwrap();
        let second = pipeline.import_sheet(&sample_sheet()).await.unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);
    }
}
