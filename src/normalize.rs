use serde::{Deserialize, Serialize};

use crate::sheets::RawCell;

const PROVINCE_COL: usize = 0;
const CITY_COL: usize = 1;
const HOTEL_NAME_COL: usize = 2;
const TV_MODEL_COL: usize = 3;
const TV_SALES_COL: usize = 4;
const LOCATION_COL: usize = 5;

/// Column convention of one sheet.
///
/// Data columns start at `column_offset`; sheets with an offset of 1 carry the
/// sub-brand in column 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SheetLayout {
    pub column_offset: usize,
    pub header_rows: usize,
}

impl SheetLayout {
    pub fn standard(header_rows: usize) -> Self {
        Self {
            column_offset: 0,
            header_rows,
        }
    }

    pub fn with_subbrand(header_rows: usize) -> Self {
        Self {
            column_offset: 1,
            header_rows,
        }
    }

    pub fn has_subbrand(&self) -> bool {
        self.column_offset > 0
    }

    fn column(&self, index: usize) -> usize {
        self.column_offset + index
    }
}

/// A normalized spreadsheet row before geocoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub brand_name: String,
    pub subbrand_name: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub hotel_name: Option<String>,
    pub tv_model: Option<String>,
    pub tv_sales: Option<i64>,
    pub location: Option<String>,
}

/// Last non-blank value seen for each hierarchical column of the current sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarryForward {
    pub province: Option<String>,
    pub city: Option<String>,
    pub hotel_name: Option<String>,
    pub subbrand_name: Option<String>,
    pub location: Option<String>,
}

impl CarryForward {
    fn fill(slot: &mut Option<String>, cell: Option<&RawCell>) -> Option<String> {
        if let Some(value) = cell.and_then(RawCell::as_text) {
            *slot = Some(value);
        }
        slot.clone()
    }
}

pub struct RowNormalizer {
    brand_name: String,
    layout: SheetLayout,
    state: CarryForward,
}

impl RowNormalizer {
    pub fn new(brand_name: impl Into<String>, layout: SheetLayout) -> Self {
        Self {
            brand_name: brand_name.into(),
            layout,
            state: CarryForward::default(),
        }
    }

    pub fn state(&self) -> &CarryForward {
        &self.state
    }

    /// Normalizes one data row. Returns `None` for rows with no content, which
    /// leave the carry-forward state untouched.
    pub fn normalize(&mut self, cells: &[RawCell]) -> Option<NormalizedRow> {
        if cells.iter().all(RawCell::is_blank) {
            return None;
        }

        let layout = self.layout;
        let cell = |index: usize| cells.get(layout.column(index));

        let subbrand_name = if layout.has_subbrand() {
            CarryForward::fill(&mut self.state.subbrand_name, cells.first())
        } else {
            None
        };
        let province = CarryForward::fill(&mut self.state.province, cell(PROVINCE_COL));
        let city = CarryForward::fill(&mut self.state.city, cell(CITY_COL));
        let hotel_name = CarryForward::fill(&mut self.state.hotel_name, cell(HOTEL_NAME_COL));
        let location = CarryForward::fill(&mut self.state.location, cell(LOCATION_COL));

        Some(NormalizedRow {
            brand_name: self.brand_name.clone(),
            subbrand_name,
            province,
            city,
            hotel_name,
            tv_model: cell(TV_MODEL_COL).and_then(RawCell::as_text),
            tv_sales: cell(TV_SALES_COL).and_then(RawCell::as_integer),
            location,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> RawCell {
        if value.is_empty() {
            RawCell::Blank
        } else {
            RawCell::Text(value.to_string())
        }
    }

    fn row(values: &[&str]) -> Vec<RawCell> {
        values.iter().map(|v| text(v)).collect()
    }

    #[test]
    fn fills_blank_cells_from_preceding_rows() {
        let mut normalizer = RowNormalizer::new("全季", SheetLayout::standard(0));
        let first = normalizer
            .normalize(&row(&["广东省", "深圳", "南山店", "55E3", "12", "深圳市南山区科技园"]))
            .unwrap();
        let second = normalizer
            .normalize(&row(&["", "", "", "65E3", "3", ""]))
            .unwrap();
        let third = normalizer
            .normalize(&row(&["", "广州", "天河店", "55E3", "", "广州市天河区"]))
            .unwrap();

        assert_eq!(first.brand_name, "全季");
        assert_eq!(second.province.as_deref(), Some("广东省"));
        assert_eq!(second.city.as_deref(), Some("深圳"));
        assert_eq!(second.hotel_name.as_deref(), Some("南山店"));
        assert_eq!(second.location.as_deref(), Some("深圳市南山区科技园"));
        assert_eq!(second.tv_model.as_deref(), Some("65E3"));
        assert_eq!(second.tv_sales, Some(3));

        assert_eq!(third.province.as_deref(), Some("广东省"));
        assert_eq!(third.city.as_deref(), Some("广州"));
        assert_eq!(third.location.as_deref(), Some("广州市天河区"));
        assert_eq!(third.tv_sales, None);
        assert_eq!(third.subbrand_name, None);
    }

    #[test]
    fn model_and_sales_are_never_carried() {
        let mut normalizer = RowNormalizer::new("全季", SheetLayout::standard(0));
        normalizer.normalize(&row(&["北京", "北京", "国贸店", "55E3", "4", "朝阳区"]));
        assert!(normalizer.normalize(&row(&["", "", "", "", "", ""])).is_none());
        let sparse = normalizer
            .normalize(&row(&["", "", "", "", "", "", "note"]))
            .unwrap();
        assert_eq!(sparse.tv_model, None);
        assert_eq!(sparse.tv_sales, None);
        assert_eq!(sparse.hotel_name.as_deref(), Some("国贸店"));
    }

    #[test]
    fn carries_leading_subbrand_column() {
        let mut normalizer = RowNormalizer::new("华住", SheetLayout::with_subbrand(0));
        let first = normalizer
            .normalize(&row(&["BrandX", "", "", "HotelA", "55E3", "2", ""]))
            .unwrap();
        let second = normalizer
            .normalize(&row(&["", "Beijing", "Chaoyang", "HotelB", "65E3", "1", "Sanlitun"]))
            .unwrap();

        assert_eq!(first.subbrand_name.as_deref(), Some("BrandX"));
        assert_eq!(first.province, None);
        assert_eq!(first.hotel_name.as_deref(), Some("HotelA"));
        assert_eq!(second.subbrand_name.as_deref(), Some("BrandX"));
        assert_eq!(second.province.as_deref(), Some("Beijing"));
        assert_eq!(second.city.as_deref(), Some("Chaoyang"));
        assert_eq!(second.hotel_name.as_deref(), Some("HotelB"));
        assert_eq!(second.location.as_deref(), Some("Sanlitun"));
    }

    #[test]
    fn offset_shifts_every_column() {
        let cells = row(&["Sub", "P", "C", "H", "M", "7", "L"]);

        let mut standard = RowNormalizer::new("B", SheetLayout::standard(0));
        let plain = standard.normalize(&cells).unwrap();
        assert_eq!(plain.province.as_deref(), Some("Sub"));
        assert_eq!(plain.hotel_name.as_deref(), Some("C"));
        assert_eq!(plain.tv_sales, None);
        assert_eq!(plain.location.as_deref(), Some("7"));

        let mut shifted = RowNormalizer::new("B", SheetLayout::with_subbrand(0));
        let offset = shifted.normalize(&cells).unwrap();
        assert_eq!(offset.subbrand_name.as_deref(), Some("Sub"));
        assert_eq!(offset.province.as_deref(), Some("P"));
        assert_eq!(offset.city.as_deref(), Some("C"));
        assert_eq!(offset.hotel_name.as_deref(), Some("H"));
        assert_eq!(offset.tv_model.as_deref(), Some("M"));
        assert_eq!(offset.tv_sales, Some(7));
        assert_eq!(offset.location.as_deref(), Some("L"));
    }

    #[test]
    fn passes_null_through_before_any_value_is_seen() {
        let mut normalizer = RowNormalizer::new("全季", SheetLayout::standard(0));
        let first = normalizer
            .normalize(&row(&["", "", "", "55E3", "1", ""]))
            .unwrap();
        assert_eq!(first.province, None);
        assert_eq!(first.city, None);
        assert_eq!(first.hotel_name, None);
        assert_eq!(first.location, None);
        assert_eq!(normalizer.state(), &CarryForward::default());
    }

    #[test]
    fn fresh_normalizer_starts_with_empty_state() {
        let mut first_sheet = RowNormalizer::new("A", SheetLayout::standard(0));
        first_sheet.normalize(&row(&["浙江省", "杭州", "西湖店", "55E3", "1", "西湖区"]));
        assert!(first_sheet.state().province.is_some());

        let mut second_sheet = RowNormalizer::new("B", SheetLayout::standard(0));
        let row = second_sheet
            .normalize(&row(&["", "", "", "55E3", "1", ""]))
            .unwrap();
        assert_eq!(row.province, None);
        assert_eq!(row.brand_name, "B");
    }
}
