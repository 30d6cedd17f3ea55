//! Synthetic placeholder output for when the inference backend is unavailable.
//!
//! ## Why keep this at all?
//!
//! Front-end and integration work should not stall because a GPU box is
//! down. With fallback allowed, every requested field still gets a value of
//! a plausible shape, so clients exercise their full rendering path. The
//! values themselves are meaningless; only the schema matters. Every result
//! produced here is tagged [`ResultSource::Synthetic`] so it can never be
//! mistaken for real output, and processing ids carry [`SYNTHETIC_PREFIX`].
//!
//! Pure and I/O-free. Randomness is drawn from UUID v4 bytes.

use crate::output::{Extraction, ExtractionField, RemotePage, ResultSource, StartResult};
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Reserved prefix of every synthetic processing id.
pub const SYNTHETIC_PREFIX: &str = "synthetic_";

const DRAWING_TITLES: &[&str] = &[
    "Floor Plan - Level 1",
    "Electrical Layout - Main Distribution",
    "Site Plan - Phase 1 Development",
    "Structural Foundation Plan",
    "HVAC System Layout",
    "Fire Safety Plan",
    "Landscape Design - Entrance",
    "Parking Layout - Section A",
    "Mechanical Room Details",
    "Emergency Exit Plan",
    "Plumbing Riser Diagram",
    "Building Elevation - North Face",
    "Cross Section - Assembly Hall",
    "Detail Drawing - Wall Assembly",
    "Roof Plan - Building Complex",
];

const DRAWING_PREFIXES: &[&str] = &["A", "S", "E", "M", "P", "L", "FP", "C"];

const REVISION_DESCRIPTIONS: &[&str] = &[
    "Initial issue for review",
    "Updated per client comments",
    "Revised structural details",
    "Code compliance updates",
    "Design development changes",
    "Final construction documents",
    "As-built revisions",
    "Permit submission updates",
    "Contractor coordination changes",
    "Field verification updates",
];

/// Small source of pseudo-random choices backed by a UUID v4.
struct Dice {
    bytes: [u8; 16],
    next: usize,
}

impl Dice {
    fn new() -> Self {
        Self {
            bytes: Uuid::new_v4().into_bytes(),
            next: 0,
        }
    }

    fn roll(&mut self) -> u16 {
        if self.next + 1 >= self.bytes.len() {
            self.bytes = Uuid::new_v4().into_bytes();
            self.next = 0;
        }
        let v = u16::from_le_bytes([self.bytes[self.next], self.bytes[self.next + 1]]);
        self.next += 2;
        v
    }

    /// Uniform-ish integer in `lo..=hi`.
    ///
    /// Spans wider than one roll draw 32 bits from two rolls.
    fn range(&mut self, lo: u32, hi: u32) -> u32 {
        let span = u64::from(hi - lo) + 1;
        let draw = if span > u64::from(u16::MAX) {
            (u64::from(self.roll()) << 16) | u64::from(self.roll())
        } else {
            u64::from(self.roll())
        };
        lo + (draw % span) as u32
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.roll() as usize % items.len()]
    }

    /// Value in `lo..hi` rounded to two decimals.
    fn decimal(&mut self, lo: f64, hi: f64) -> f64 {
        let unit = f64::from(self.roll()) / f64::from(u16::MAX);
        ((lo + unit * (hi - lo)) * 100.0).round() / 100.0
    }
}

/// A fresh `synthetic_<8 hex>` processing id.
pub fn processing_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{SYNTHETIC_PREFIX}{}", &hex[..8])
}

/// Whether `processing_id` was minted by [`processing_id`].
pub fn is_synthetic_id(processing_id: &str) -> bool {
    processing_id.starts_with(SYNTHETIC_PREFIX)
}

/// A value for every requested field, shaped by the field name.
pub fn page_data(fields: &[ExtractionField], page_number: u32) -> Map<String, Value> {
    let mut dice = Dice::new();
    fields
        .iter()
        .map(|f| {
            (
                f.field_name.clone(),
                field_value(&f.field_name, page_number, &mut dice),
            )
        })
        .collect()
}

/// [`page_data`] tagged as synthetic.
pub fn extraction(fields: &[ExtractionField], page_number: u32) -> Extraction {
    Extraction {
        data: page_data(fields, page_number),
        source: ResultSource::Synthetic,
    }
}

fn field_value(name: &str, page_number: u32, dice: &mut Dice) -> Value {
    let key = name.to_lowercase();
    let has = |needle: &str| key.contains(needle);

    if has("date") {
        let days = i64::from(dice.range(30, 365));
        let date = Utc::now() - Duration::days(days);
        Value::String(date.format("%Y-%m-%d").to_string())
    } else if has("title") {
        Value::String(drawing_title(page_number, dice))
    } else if has("serial") {
        Value::String(format!("SN{}", dice.range(100_000_000, 999_999_999)))
    } else if has("manufacturer") || has("vendor") {
        Value::String("ACME Industrial Corp".into())
    } else if has("model") {
        Value::String("Industrial Pump Model XL-500".into())
    } else if has("revision") {
        Value::String(format!("Rev {}", revision_letter(dice.range(0, 3))))
    } else if has("description") {
        Value::String(dice.pick(REVISION_DESCRIPTIONS).into())
    } else if has("amount") || has("total") || has("price") || has("cost") {
        json!(dice.decimal(10.0, 10_000.0))
    } else if has("confidence") || has("score") {
        json!(dice.decimal(0.75, 0.95))
    } else if has("count") || has("quantity") {
        json!(dice.range(1, 50))
    } else if has("number") || has("_id") || key == "id" || has("code") {
        Value::String(drawing_number(dice))
    } else if has("name") {
        Value::String("Jane Sample".into())
    } else if has("type") {
        Value::String("Centrifugal Pump".into())
    } else {
        Value::String(format!("Sample {}", title_case(name)))
    }
}

fn drawing_title(page_number: u32, dice: &mut Dice) -> String {
    let title = dice.pick(DRAWING_TITLES);
    if page_number > 1 {
        format!("{title} - Sheet {page_number}")
    } else {
        title.to_string()
    }
}

fn drawing_number(dice: &mut Dice) -> String {
    format!("{}-{}", dice.pick(DRAWING_PREFIXES), dice.range(100, 999))
}

fn revision_letter(i: u32) -> char {
    char::from(b'A' + (i % 26) as u8)
}

fn title_case(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drawing metadata in the backend-driven result shape.
pub fn metadata(page_number: u32) -> Value {
    let mut dice = Dice::new();
    let revision_count = dice.range(1, 4);
    let mut date = Utc::now() - Duration::days(i64::from(dice.range(30, 365)));
    let mut revisions = Vec::with_capacity(revision_count as usize);
    for i in 0..revision_count {
        date += Duration::days(i64::from(dice.range(0, 30)));
        revisions.push(json!({
            "revision_id": revision_letter(i).to_string(),
            "revision_description": dice.pick(REVISION_DESCRIPTIONS),
            "revision_date": date.format("%Y-%m-%d").to_string(),
        }));
        date += Duration::days(i64::from(dice.range(1, 14)));
    }

    json!({
        "drawing_title": drawing_title(page_number, &mut dice),
        "drawing_number": drawing_number(&mut dice),
        "revision_history": revisions,
        "confidence_score": dice.decimal(0.75, 0.95),
        "source": "synthetic",
    })
}

/// Synthetic answer to a backend-driven start.
pub fn start_response(filename: &str) -> StartResult {
    let mut dice = Dice::new();
    StartResult {
        processing_id: processing_id(),
        status: "started".into(),
        result: Some(metadata(1)),
        estimated_pages: Some(dice.range(1, 20)),
        message: Some(format!(
            "Processing of {filename} started with synthetic data (backend unavailable)"
        )),
        source: ResultSource::Synthetic,
    }
}

/// Synthetic answer to a backend-driven page poll.
pub fn page_response(processing_id: &str, page_number: u32) -> RemotePage {
    let mut dice = Dice::new();
    RemotePage {
        processing_id: processing_id.to_string(),
        page_number,
        status: "completed".into(),
        result: metadata(page_number),
        processing_time: dice.decimal(0.3, 1.5),
        message: Some(format!("Page {page_number} processed with synthetic data")),
        source: ResultSource::Synthetic,
        attempts: 0,
    }
}
