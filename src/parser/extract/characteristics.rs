use serde_json::{Map, Value};

use super::{FieldContext, FieldResult};
use crate::error::{kind_name, FieldError};
use crate::parser::finders::{find_first_dict_by_key_path, value_at_path};
use crate::record::Field;

const COMBINED_PATH: &[&str] = &["classified", "vehicle", "combined"];
const FLAT_PATHS: &[&[&str]] = &[&["data", "vehicle"], &["vehicle"]];

type Row = (&'static str, &'static [&'static str]);

const SPECS_TABLE: &[Row] = &[
    ("Transmission", &["gearbox"]),
    ("Energy", &["energy"]),
    ("Doors", &["nbOfDoors"]),
    ("Seats", &["seatingCapacity"]),
    ("Fiscal power", &["fiscalHorsePower"]),
    ("DIN power", &["powerDin"]),
    ("Euro standard", &["critair", "standardMet"]),
    ("Crit'Air", &["critair", "critairLevel"]),
    ("Consumption", &["consumption", "consumption120"]),
    ("CO2 emissions", &["co2", "combined"]),
    ("Displacement", &["cubic"]),
    ("Length", &["length"]),
    ("Width", &["width"]),
    ("Height", &["height"]),
    ("Weight", &["weight"]),
    ("Max boot volume", &["maxTrunkVolume"]),
    ("Warranty", &["warranty"]),
];

const VERSION_TABLE: &[Row] = &[
    ("Make", &["make"]),
    ("Model", &["model"]),
    ("Commercial model", &["commercialModel"]),
    ("Trim", &["trimLevel"]),
];

const FLAT_TABLE: &[Row] = &[
    ("Transmission", &["gearbox"]),
    ("Energy", &["energy"]),
    ("Mileage", &["mileage"]),
    ("Year", &["year"]),
    ("First registration", &["firstTrafficDate"]),
    ("Owners", &["nbOfOwners"]),
    ("Colour", &["externalColor"]),
    ("Doors", &["nbOfDoors"]),
    ("Seats", &["seatingCapacity"]),
    ("Fiscal power", &["fiscalHorsePower"]),
    ("DIN power", &["powerDin"]),
    ("Euro standard", &["critair", "standardMet"]),
    ("Crit'Air", &["critair", "critairLevel"]),
    ("Consumption", &["consumption", "consumption120"]),
    ("CO2 emissions", &["co2", "combined"]),
    ("Make", &["make"]),
    ("Model", &["model"]),
    ("Version", &["version"]),
    ("Body type", &["bodyType"]),
    ("Displacement", &["displacement"]),
    ("Fuel", &["fuelType"]),
    ("Transmission type", &["transmission"]),
    ("Drive", &["driveType"]),
    ("First hand", &["firstHand"]),
    ("Technical inspection", &["technicalInspection"]),
    ("Warranty", &["warranty"]),
    ("History", &["history"]),
    ("Positioning", &["positioning"]),
];

/// Which attribute table to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// `classified.vehicle.combined.{specs, version, firstTrafficDate}`.
    Specs,
    /// `data.vehicle` or `vehicle`, one flat table.
    VehicleAttributes,
}

/// Try each variant in order; the first one producing lines wins.
pub fn extract(root: &Value, ctx: &FieldContext, variants: &[Variant]) -> FieldResult<String> {
    let mut first_err = None;
    for variant in variants {
        let lines = match variant {
            Variant::Specs => specs_lines(root),
            Variant::VehicleAttributes => flat_lines(root),
        };
        match lines {
            Ok(Some(lines)) if !lines.is_empty() => return Ok(Some(lines.join(ctx.delimiter))),
            Ok(_) => {}
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

fn specs_lines(root: &Value) -> FieldResult<Vec<String>> {
    let Some(combined) = find_first_dict_by_key_path(root, COMBINED_PATH) else {
        return Ok(None);
    };
    let Some(specs) = combined.get("specs") else {
        return Ok(None);
    };
    let specs = expect_mapping(specs, "classified.vehicle.combined.specs")?;

    let mut lines = table_lines(specs, SPECS_TABLE);
    if let Some(Value::Object(version)) = combined.get("version") {
        lines.extend(table_lines(version, VERSION_TABLE));
    }
    if let Some(date) = combined.get("firstTrafficDate").and_then(render) {
        lines.push(format!("First registration: {date}"));
    }
    Ok(Some(lines))
}

fn flat_lines(root: &Value) -> FieldResult<Vec<String>> {
    for path in FLAT_PATHS {
        if let Some(v) = value_at_path(root, path) {
            let table = expect_mapping(v, &path.join("."))?;
            return Ok(Some(table_lines(table, FLAT_TABLE)));
        }
    }
    Ok(None)
}

fn expect_mapping<'a>(v: &'a Value, path: &str) -> Result<&'a Map<String, Value>, FieldError> {
    v.as_object().ok_or_else(|| FieldError::Shape {
        field: Field::Characteristics,
        path: path.to_string(),
        expected: "mapping",
        found: kind_name(v),
    })
}

fn table_lines(source: &Map<String, Value>, table: &[Row]) -> Vec<String> {
    table
        .iter()
        .filter_map(|(label, path)| {
            let (head, rest) = path.split_first()?;
            let v = value_at_path(source.get(*head)?, rest)?;
            render(v).map(|value| format!("{label}: {value}"))
        })
        .collect()
}

fn render(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Bool(b) => Some(if *b { "yes" } else { "no" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(v.to_string()),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> FieldContext<'static> {
        FieldContext {
            delimiter: " | ",
            default_country: "FRANCE",
        }
    }

    #[test]
    fn specs_follow_table_order_not_source_order() {
        let tree = json!({"classified": {"vehicle": {"combined": {
            "specs": {
                "co2": {"combined": 118},
                "seatingCapacity": 5,
                "gearbox": "Automatique",
                "critair": {"standardMet": "Euro 6", "critairLevel": null}
            },
            "version": {"trimLevel": "GT Line", "make": "Renault"},
            "firstTrafficDate": "2021-03-15"
        }}}});
        let out = extract(&tree, &ctx(), &[Variant::Specs]).unwrap().unwrap();
        assert_eq!(
            out,
            "Transmission: Automatique | Seats: 5 | Euro standard: Euro 6 | CO2 emissions: 118 \
             | Make: Renault | Trim: GT Line | First registration: 2021-03-15"
        );
    }

    #[test]
    fn flat_vehicle_table() {
        let tree = json!({"data": {"vehicle": {
            "make": "Peugeot", "energy": "Diesel", "firstHand": true, "mileage": 45000, "history": ""
        }}});
        let out = extract(&tree, &ctx(), &[Variant::Specs, Variant::VehicleAttributes])
            .unwrap()
            .unwrap();
        assert_eq!(out, "Energy: Diesel | Mileage: 45000 | Make: Peugeot | First hand: yes");
    }

    #[test]
    fn later_variant_fills_when_earlier_is_malformed() {
        let tree = json!({
            "classified": {"vehicle": {"combined": {"specs": []}}},
            "vehicle": {"gearbox": "Manuelle"}
        });
        let out = extract(&tree, &ctx(), &[Variant::Specs, Variant::VehicleAttributes]).unwrap();
        assert_eq!(out.as_deref(), Some("Transmission: Manuelle"));
        assert!(matches!(
            extract(&tree, &ctx(), &[Variant::Specs]),
            Err(FieldError::Shape { expected: "mapping", found: "array", .. })
        ));
    }

    #[test]
    fn absent_tables_are_not_errors() {
        assert_eq!(extract(&json!({"a": 1}), &ctx(), &[Variant::Specs, Variant::VehicleAttributes]).unwrap(), None);
        let empty_specs = json!({"classified": {"vehicle": {"combined": {"specs": {}}}}});
        assert_eq!(extract(&empty_specs, &ctx(), &[Variant::Specs]).unwrap(), None);
    }

    #[test]
    fn scalar_combined_block_is_absent() {
        let tree = json!({"classified": {"vehicle": {"combined": "n/a"}}});
        assert_eq!(extract(&tree, &ctx(), &[Variant::Specs]).unwrap(), None);
    }
}
