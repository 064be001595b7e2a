pub mod characteristics;
pub mod lists;
pub mod numbers;
pub mod phone;
pub mod seller;
pub mod text;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::FieldError;
use crate::record::{ExtractedRecord, Field};
use characteristics::Variant;

pub type FieldResult<T> = Result<Option<T>, FieldError>;

/// Settings every extractor may need.
#[derive(Debug, Clone)]
pub struct FieldContext<'c> {
    pub delimiter: &'c str,
    pub default_country: &'c str,
}

/// An extractor that failed internally; its field stayed null.
#[derive(Debug, Clone, Serialize)]
pub struct FieldFailure {
    pub field: Field,
    pub error: String,
}

/// Listing details reported alongside the record but never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SupplementaryFields {
    pub warranty: Option<String>,
    pub guarantees: Option<String>,
    pub technical_sheet_url: Option<String>,
}

impl SupplementaryFields {
    pub fn merge_preferring(&self, other: &SupplementaryFields) -> SupplementaryFields {
        SupplementaryFields {
            warranty: self.warranty.clone().or_else(|| other.warranty.clone()),
            guarantees: self.guarantees.clone().or_else(|| other.guarantees.clone()),
            technical_sheet_url: self
                .technical_sheet_url
                .clone()
                .or_else(|| other.technical_sheet_url.clone()),
        }
    }
}

/// What one tree yielded.
#[derive(Debug, Clone, Default)]
pub struct Partial {
    pub record: ExtractedRecord,
    pub extras: SupplementaryFields,
    pub failures: Vec<FieldFailure>,
}

impl Partial {
    fn settle<T>(&mut self, field: Field, result: FieldResult<T>) -> Option<T> {
        match result {
            Ok(Some(v)) => Some(v),
            Ok(None) => {
                debug!(field = %field, "field absent");
                None
            }
            Err(e) => {
                warn!(field = %field, error = %e, "field extraction failed; left null");
                self.failures.push(FieldFailure {
                    field,
                    error: e.to_string(),
                });
                None
            }
        }
    }
}

/// Run every field extractor against one tree. Failures stay local to their
/// field.
pub fn extract_fields(root: &Value, url: &str, ctx: &FieldContext, variants: &[Variant]) -> Partial {
    let mut p = Partial {
        record: ExtractedRecord::new(url),
        ..Default::default()
    };

    let title = p.settle(Field::Title, text::title(root));
    let price = p.settle(Field::PriceEur, numbers::price(root));
    let mileage = p.settle(Field::MileageKm, numbers::mileage(root));
    let phone = p.settle(Field::Phone, phone::phone(root));
    let equipment = p.settle(Field::EquipmentOptions, lists::equipment(root, ctx));
    let characteristics = p.settle(
        Field::Characteristics,
        characteristics::extract(root, ctx, variants),
    );
    let features = p.settle(Field::Features, lists::features(root, ctx));
    let comment = p.settle(Field::SellerComment, text::seller_comment(root));
    let agency = p.settle(Field::AgencyName, seller::agency_name(root));
    let address = p.settle(Field::Address, seller::address(root, ctx));

    p.record.title = title;
    p.record.price_eur = price;
    p.record.mileage_km = mileage;
    p.record.phone = phone;
    p.record.equipment_options = equipment;
    p.record.characteristics = characteristics;
    p.record.features = features;
    p.record.seller_comment = comment;
    p.record.agency_name = agency;
    p.record.address = address;

    p.extras = SupplementaryFields {
        warranty: lists::warranty(root, ctx),
        guarantees: lists::guarantees(root, ctx),
        technical_sheet_url: text::technical_sheet_url(root),
    };
    p
}

// ── Tests ──
