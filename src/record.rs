use std::fmt;

use serde::{Deserialize, Serialize};

/// One listing. Field declaration order is the serialized column order and
/// must not change: earlier outputs are compared against it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedRecord {
    pub title: Option<String>,
    pub price_eur: Option<i64>,
    pub agency_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub mileage_km: Option<i64>,
    pub equipment_options: Option<String>,
    pub characteristics: Option<String>,
    pub features: Option<String>,
    pub seller_comment: Option<String>,
    #[serde(alias = "ad_url")]
    pub resource_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    PriceEur,
    AgencyName,
    Phone,
    Address,
    MileageKm,
    EquipmentOptions,
    Characteristics,
    Features,
    SellerComment,
}

impl Field {
    /// Output order, `resource_url` excluded.
    pub const ALL: [Field; 10] = [
        Field::Title,
        Field::PriceEur,
        Field::AgencyName,
        Field::Phone,
        Field::Address,
        Field::MileageKm,
        Field::EquipmentOptions,
        Field::Characteristics,
        Field::Features,
        Field::SellerComment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::PriceEur => "price_eur",
            Field::AgencyName => "agency_name",
            Field::Phone => "phone",
            Field::Address => "address",
            Field::MileageKm => "mileage_km",
            Field::EquipmentOptions => "equipment_options",
            Field::Characteristics => "characteristics",
            Field::Features => "features",
            Field::SellerComment => "seller_comment",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Column order for any serializer layered on top of the record.
#[cfg(test)]
pub const OUTPUT_COLUMNS: [&str; 11] = [
    "title",
    "price_eur",
    "agency_name",
    "phone",
    "address",
    "mileage_km",
    "equipment_options",
    "characteristics",
    "features",
    "seller_comment",
    "resource_url",
];

/// Where a field value came from. Only used for precedence and audit logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceTier {
    NamedBlob,
    CanonicalTree,
    DomFallback,
    InteractiveReveal,
}

impl ExtractedRecord {
    pub fn new(resource_url: impl Into<String>) -> Self {
        ExtractedRecord {
            resource_url: resource_url.into(),
            ..Default::default()
        }
    }

    /// Null, blank and zero all count as "not set".
    pub fn is_set(&self, field: Field) -> bool {
        match field {
            Field::Title => text_set(&self.title),
            Field::PriceEur => number_set(self.price_eur),
            Field::AgencyName => text_set(&self.agency_name),
            Field::Phone => text_set(&self.phone),
            Field::Address => text_set(&self.address),
            Field::MileageKm => number_set(self.mileage_km),
            Field::EquipmentOptions => text_set(&self.equipment_options),
            Field::Characteristics => text_set(&self.characteristics),
            Field::Features => text_set(&self.features),
            Field::SellerComment => text_set(&self.seller_comment),
        }
    }

    pub fn has_essentials(&self) -> bool {
        self.is_set(Field::Title) && self.is_set(Field::PriceEur)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        Field::ALL.iter().all(|f| !self.is_set(*f))
    }

    /// Rendered value for tables and logs.
    pub fn display(&self, field: Field) -> Option<String> {
        match field {
            Field::Title => self.title.clone(),
            Field::PriceEur => self.price_eur.map(|v| v.to_string()),
            Field::AgencyName => self.agency_name.clone(),
            Field::Phone => self.phone.clone(),
            Field::Address => self.address.clone(),
            Field::MileageKm => self.mileage_km.map(|v| v.to_string()),
            Field::EquipmentOptions => self.equipment_options.clone(),
            Field::Characteristics => self.characteristics.clone(),
            Field::Features => self.features.clone(),
            Field::SellerComment => self.seller_comment.clone(),
        }
    }
}

fn text_set(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn number_set(v: Option<i64>) -> bool {
    v.is_some_and(|n| n != 0)
}

fn prefer_text(primary: &Option<String>, secondary: &Option<String>) -> Option<String> {
    if text_set(primary) {
        primary.clone()
    } else if text_set(secondary) {
        secondary.clone()
    } else {
        None
    }
}

fn prefer_number(primary: Option<i64>, secondary: Option<i64>) -> Option<i64> {
    if number_set(primary) {
        primary
    } else if number_set(secondary) {
        secondary
    } else {
        None
    }
}

/// Field-wise combination keeping `primary` wherever it is set.
/// Argument order is precedence order.
pub fn merge_preferring(primary: &ExtractedRecord, secondary: &ExtractedRecord) -> ExtractedRecord {
    ExtractedRecord {
        title: prefer_text(&primary.title, &secondary.title),
        price_eur: prefer_number(primary.price_eur, secondary.price_eur),
        agency_name: prefer_text(&primary.agency_name, &secondary.agency_name),
        phone: prefer_text(&primary.phone, &secondary.phone),
        address: prefer_text(&primary.address, &secondary.address),
        mileage_km: prefer_number(primary.mileage_km, secondary.mileage_km),
        equipment_options: prefer_text(&primary.equipment_options, &secondary.equipment_options),
        characteristics: prefer_text(&primary.characteristics, &secondary.characteristics),
        features: prefer_text(&primary.features, &secondary.features),
        seller_comment: prefer_text(&primary.seller_comment, &secondary.seller_comment),
        resource_url: if primary.resource_url.trim().is_empty() {
            secondary.resource_url.clone()
        } else {
            primary.resource_url.clone()
        },
    }
}

/// Trimmed text, or `None` when nothing is left. Extractors never emit `""`.
pub fn clean_text(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExtractedRecord {
        ExtractedRecord {
            title: Some("Clio V".into()),
            price_eur: Some(15990),
            phone: Some("0612345678".into()),
            ..ExtractedRecord::new("https://example.test/annonce-1.html")
        }
    }

    #[test]
    fn merge_with_itself_is_identity() {
        let a = sample();
        assert_eq!(merge_preferring(&a, &a), a);
    }

    #[test]
    fn primary_values_never_change() {
        let a = sample();
        let b = ExtractedRecord {
            title: Some("Other".into()),
            price_eur: Some(1),
            mileage_km: Some(42000),
            ..ExtractedRecord::new("https://example.test/other")
        };
        let merged = merge_preferring(&a, &b);
        assert_eq!(merged.title.as_deref(), Some("Clio V"));
        assert_eq!(merged.price_eur, Some(15990));
        assert_eq!(merged.mileage_km, Some(42000));
        assert_eq!(merged.resource_url, a.resource_url);
    }

    #[test]
    fn blank_and_zero_are_filled() {
        let a = ExtractedRecord {
            title: Some("  ".into()),
            price_eur: Some(0),
            ..ExtractedRecord::new("u")
        };
        let b = sample();
        let merged = merge_preferring(&a, &b);
        assert_eq!(merged.title.as_deref(), Some("Clio V"));
        assert_eq!(merged.price_eur, Some(15990));
    }

    #[test]
    fn blank_on_both_sides_becomes_null() {
        let a = ExtractedRecord {
            features: Some(String::new()),
            ..ExtractedRecord::new("u")
        };
        let merged = merge_preferring(&a, &a.clone());
        assert_eq!(merged.features, None);
    }

    #[test]
    fn serialized_keys_follow_output_columns() {
        let json = serde_json::to_value(sample()).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, OUTPUT_COLUMNS.to_vec());
    }

    #[test]
    fn legacy_ad_url_key_is_accepted() {
        let r: ExtractedRecord =
            serde_json::from_str(r#"{"title":"A","ad_url":"https://x.test/1"}"#).unwrap();
        assert_eq!(r.resource_url, "https://x.test/1");
        assert_eq!(r.price_eur, None);
    }

    #[test]
    fn clean_text_rejects_blank() {
        assert_eq!(clean_text("  \n"), None);
        assert_eq!(clean_text(" a ").as_deref(), Some("a"));
    }
}
