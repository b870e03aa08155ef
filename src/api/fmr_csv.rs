// src/api/fmr_csv.rs
use super::{ApiOutcome, DataApi, ReferenceData};
use crate::cache::AreaParams;
use crate::domain::finance::RentTable;
use crate::errors::OverlayError;
use async_trait::async_trait;
use log::{info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Offline data source backed by a HUD Small Area FMR CSV export. Only FMR
/// rents are available; area parameters are fixed defaults.
pub struct LocalFmrApi {
    rents: HashMap<String, RentTable>,
    area: AreaParams,
}

fn squash(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Column for `beds`, preferring SAFMR columns over plain FMR ones.
fn bedroom_column(headers: &[String], beds: u32) -> Option<usize> {
    let tag = format!("{beds}br");
    let plain = format!("fmr{beds}");
    let matches = |h: &String| h.contains(&tag) || h.ends_with(&plain);
    headers
        .iter()
        .position(|h| h.contains("safmr") && matches(h))
        .or_else(|| headers.iter().position(matches))
}

fn parse_money(cell: &str) -> Option<f64> {
    let cleaned: String = cell
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)
}

fn normalize_zip(cell: &str) -> Option<String> {
    let digits = cell.trim().split(['.', '-']).next()?.trim();
    if digits.is_empty() || digits.len() > 5 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // Spreadsheet round-trips drop leading zeros.
    Some(format!("{digits:0>5}"))
}

impl LocalFmrApi {
    pub fn from_path(path: impl AsRef<Path>, area: AreaParams) -> Result<Self, OverlayError> {
        let file = File::open(path.as_ref())?;
        let api = Self::from_reader(file, area)?;
        info!(
            "loaded FMR rents for {} ZIP codes from {}",
            api.rents.len(),
            path.as_ref().display()
        );
        Ok(api)
    }

    pub fn from_reader<R: Read>(reader: R, area: AreaParams) -> Result<Self, OverlayError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(squash).collect();
        let zip_col = headers
            .iter()
            .position(|h| h.contains("zip"))
            .ok_or_else(|| OverlayError::Config("FMR file has no ZIP column".into()))?;

        let mut cols = [0usize; 5];
        for (beds, slot) in cols.iter_mut().enumerate() {
            *slot = bedroom_column(&headers, beds as u32).ok_or_else(|| {
                OverlayError::Config(format!("FMR file has no {beds}-bedroom column"))
            })?;
        }

        let mut rents = HashMap::new();
        let mut skipped = 0usize;
        for record in rdr.records() {
            let record = record?;
            let zip = record.get(zip_col).and_then(normalize_zip);
            let values: Option<Vec<f64>> = cols
                .iter()
                .map(|c| record.get(*c).and_then(parse_money))
                .collect();
            match (zip, values) {
                (Some(zip), Some(v)) => {
                    rents.insert(
                        zip,
                        RentTable {
                            studio: v[0],
                            one: v[1],
                            two: v[2],
                            three: v[3],
                            four: v[4],
                        },
                    );
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("skipped {skipped} FMR rows without a ZIP or complete rents");
        }

        Ok(Self { rents, area })
    }

    pub fn len(&self) -> usize {
        self.rents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rents.is_empty()
    }
}

#[async_trait(?Send)]
impl DataApi for LocalFmrApi {
    async fn fetch_reference_data(&self, zip: &str) -> ApiOutcome<ReferenceData> {
        match self.rents.get(zip) {
            Some(fmr) => ApiOutcome::Data(ReferenceData {
                fmr: *fmr,
                market: None,
            }),
            None => ApiOutcome::Error(format!("no FMR data for {zip}")),
        }
    }

    async fn fetch_area_params(&self, _zip: &str) -> ApiOutcome<AreaParams> {
        ApiOutcome::Data(self.area)
    }
}
