use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::extract::numbers::digits_value;
use super::extract::phone;
use super::extract::{FieldContext, Partial, SupplementaryFields};
use super::finders::OrderedSet;
use super::surface::element_text;
use crate::record::ExtractedRecord;

const TITLE_SELECTORS: &[&str] = &["h1", "aside h2", "[data-testid*='title']", "[class*='title']"];
const PRICE_SELECTORS: &[&str] = &["[class*='price']", "[data-testid*='price']"];
const MILEAGE_LABELS: &[&str] = &["Kilométrage", "Kilometrage", "Mileage", "km"];
const WARRANTY_LABELS: &[&str] = &["Garantie", "Warranty"];
const EQUIPMENT_HEADINGS: &[&str] = &["Équipements", "Equipements", "Options"];
const COMMENT_HEADINGS: &[&str] = &["Commentaire du vendeur"];
const AGENCY_HEADINGS: &[&str] = &["Automobile agency", "Agence"];
const CHARACTERISTICS_HEADINGS: &[&str] = &["Caractéristiques", "Caracteristiques"];
const CHARACTERISTICS_CONTAINERS: &str = "[id*='caract'], [id*='character'], [data-testid*='caract']";
const STRENGTH_ITEMS: &[&str] = &[
    "#strengths li, #strengths [role='listitem']",
    "[id*='strength'] li, [id*='strength'] [role='listitem']",
];
const TECH_SHEET_LINKS: &str = "a[href*='fiche-technique'], a[href*='fiche_technique']";
pub const CONTACT_LABELS: &[&str] = &[
    "N° téléphone",
    "Phone number",
    "Voir le numéro",
    "Afficher le numéro",
    "Téléphone",
];

const MIN_TITLE_CHARS: usize = 3;
const MAX_FEATURE_CHARS: usize = 80;
const MIN_AGENCY_CHARS: usize = 4;
const MIN_PHONE_DIGITS: usize = 10;

static AGENCY_NOISE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)automobile|agence|voir|carte|annonces du pro").unwrap());
static DIGIT_GROUPS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\d\s]{10,}").unwrap());

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn first_text(root: ElementRef<'_>, css: &str) -> Option<String> {
    let sel = selector(css)?;
    root.select(&sel)
        .map(element_text)
        .find(|t| !t.is_empty())
}

/// Read the `<dd>` following the first `<dt>` whose text contains a label.
fn definition_value(html: &Html, labels: &[&str]) -> Option<String> {
    let dt_sel = selector("dt")?;
    labels.iter().find_map(|label| {
        let needle = label.to_lowercase();
        html.select(&dt_sel)
            .filter(|dt| element_text(*dt).to_lowercase().contains(&needle))
            .find_map(|dt| {
                dt.next_siblings()
                    .filter_map(ElementRef::wrap)
                    .find(|sib| sib.value().name() == "dd")
                    .map(element_text)
                    .filter(|t| !t.is_empty())
            })
    })
}

/// Nearest `section`/`div` enclosing the first h2/h3 mentioning a heading.
fn section_for<'a>(html: &'a Html, headings: &[&str]) -> Option<(ElementRef<'a>, String)> {
    let head_sel = selector("h2, h3")?;
    let head = html.select(&head_sel).find(|h| {
        let text = element_text(*h);
        headings.iter().any(|needle| text.contains(needle))
    })?;
    let container = head
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| matches!(a.value().name(), "section" | "div"))
        .unwrap_or(head);
    Some((container, element_text(head)))
}

fn items_in(container: ElementRef<'_>, css: &str) -> OrderedSet {
    let mut out = OrderedSet::default();
    if let Some(sel) = selector(css) {
        for el in container.select(&sel) {
            out.push(&element_text(el));
        }
    }
    out
}

fn title(html: &Html) -> Option<String> {
    TITLE_SELECTORS
        .iter()
        .find_map(|css| first_text(html.root_element(), css))
        .filter(|t| t.chars().count() >= MIN_TITLE_CHARS)
}

fn price(html: &Html) -> Option<i64> {
    let from_selector = PRICE_SELECTORS
        .iter()
        .filter_map(|css| first_text(html.root_element(), css))
        .find_map(|t| digits_value(&t));
    from_selector
        .or_else(|| {
            html.root_element()
                .text()
                .find(|t| t.contains('€'))
                .and_then(digits_value)
        })
        .filter(|p| *p > 0)
}

fn mileage(html: &Html) -> Option<i64> {
    definition_value(html, MILEAGE_LABELS)
        .and_then(|t| digits_value(&t))
        .filter(|km| *km > 0)
}

fn technical_sheet_url(html: &Html) -> Option<String> {
    let by_href = selector(TECH_SHEET_LINKS).and_then(|sel| {
        html.select(&sel)
            .find_map(|a| a.value().attr("href").map(str::to_string))
    });
    by_href.or_else(|| {
        let sel = selector("a[href]")?;
        html.select(&sel)
            .find(|a| element_text(*a).to_lowercase().contains("fiche technique"))
            .and_then(|a| a.value().attr("href").map(str::to_string))
    })
}

fn equipment(html: &Html, ctx: &FieldContext) -> Option<String> {
    let (container, _) = section_for(html, EQUIPMENT_HEADINGS)?;
    let items = items_in(container, "li");
    (!items.is_empty()).then(|| items.into_vec().join(ctx.delimiter))
}

fn seller_comment(html: &Html) -> Option<String> {
    let (container, heading) = section_for(html, COMMENT_HEADINGS)?;
    let lines: Vec<&str> = container
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != heading)
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn agency_name(html: &Html) -> Option<String> {
    let (container, _) = section_for(html, AGENCY_HEADINGS)?;
    let sel = selector("a, strong")?;
    container
        .select(&sel)
        .map(element_text)
        .find(|t| t.chars().count() >= MIN_AGENCY_CHARS && !AGENCY_NOISE_RE.is_match(t))
}

fn features(html: &Html, ctx: &FieldContext) -> Option<String> {
    STRENGTH_ITEMS.iter().find_map(|css| {
        let sel = selector(css)?;
        let mut out = OrderedSet::default();
        for el in html.select(&sel) {
            let text = element_text(el);
            if text.chars().count() < MAX_FEATURE_CHARS {
                out.push(&text);
            }
        }
        (!out.is_empty()).then(|| out.into_vec().join(ctx.delimiter))
    })
}

fn characteristics(html: &Html, ctx: &FieldContext) -> Option<String> {
    let container = section_for(html, CHARACTERISTICS_HEADINGS)
        .map(|(c, _)| c)
        .or_else(|| {
            let sel = selector(CHARACTERISTICS_CONTAINERS)?;
            html.select(&sel).next()
        })?;
    let dt_sel = selector("dt")?;
    let lines: Vec<String> = container
        .select(&dt_sel)
        .filter_map(|dt| {
            let label = element_text(dt);
            let value = dt
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|sib| sib.value().name() == "dd")
                .map(element_text)?;
            (!label.is_empty() && !value.is_empty()).then(|| format!("{label}: {value}"))
        })
        .collect();
    (!lines.is_empty()).then(|| lines.join(ctx.delimiter))
}

/// Longest grouped-digit run inside the block around a contact control,
/// then any `tel:` link.
fn phone_number(html: &Html) -> Option<String> {
    let near_control = selector("button, a").and_then(|sel| {
        let control = html.select(&sel).find(|el| {
            let text = element_text(*el);
            CONTACT_LABELS.iter().any(|l| text.contains(l))
        })?;
        let area = control
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|a| matches!(a.value().name(), "section" | "div" | "aside"))
            .unwrap_or(control);
        let text: String = area.text().collect::<Vec<_>>().join(" ");
        DIGIT_GROUPS_RE
            .find_iter(&text)
            .map(|m| m.as_str().split_whitespace().collect::<String>())
            .filter(|digits| digits.len() >= MIN_PHONE_DIGITS)
            .max_by_key(|digits| digits.len())
    });
    near_control.or_else(|| {
        let sel = selector("a[href^='tel:']")?;
        html.select(&sel)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| phone::normalize(href.trim_start_matches("tel:")))
    })
}

/// Every markup-derived field. Missing pieces stay null.
pub fn extract(markup: &str, url: &str, ctx: &FieldContext) -> Partial {
    let html = Html::parse_document(markup);
    let warranty = definition_value(&html, WARRANTY_LABELS);
    let record = ExtractedRecord {
        title: title(&html),
        price_eur: price(&html),
        agency_name: agency_name(&html),
        phone: phone_number(&html),
        address: None,
        mileage_km: mileage(&html),
        equipment_options: equipment(&html, ctx),
        characteristics: characteristics(&html, ctx),
        features: features(&html, ctx),
        seller_comment: seller_comment(&html),
        resource_url: url.to_string(),
    };
    Partial {
        record,
        extras: SupplementaryFields {
            guarantees: warranty.clone(),
            warranty,
            technical_sheet_url: technical_sheet_url(&html),
        },
        failures: Vec::new(),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FieldContext<'static> {
        FieldContext {
            delimiter: " | ",
            default_country: "FRANCE",
        }
    }

    const PAGE: &str = r#"<html><body>
      <h1>Citroën C3 PureTech 83</h1>
      <div class="ad-price">9 490 €</div>
      <dl><dt>Année</dt><dd>2019</dd><dt>Kilométrage</dt><dd>61 200 km</dd><dt>Garantie</dt><dd>6 mois</dd></dl>
      <section><h2>Caractéristiques</h2>
        <dl><dt>Boîte de vitesse</dt><dd>Manuelle</dd><dt>Énergie</dt><dd>Essence</dd></dl>
      </section>
      <section><h2>Équipements et options</h2><ul><li>Climatisation</li><li>Bluetooth</li><li>Climatisation</li></ul></section>
      <section><h3>Commentaire du vendeur</h3><p>Première main.</p><p>Entretien à jour.</p></section>
      <div id="strengths"><ul><li>Crit'Air 1</li><li>Faible   kilométrage</li></ul></div>
      <section><h2>Agence</h2><a href="/pro">Voir les annonces du pro</a><strong>Garage du Centre</strong></section>
      <a href="https://example.test/fiche-technique/c3">Fiche technique</a>
      <aside><div><button>Voir le numéro</button><span>04 72 00 11 22</span></div></aside>
    </body></html>"#;

    #[test]
    fn label_anchored_fields() {
        let p = extract(PAGE, "u", &ctx());
        let r = &p.record;
        assert_eq!(r.title.as_deref(), Some("Citroën C3 PureTech 83"));
        assert_eq!(r.price_eur, Some(9490));
        assert_eq!(r.mileage_km, Some(61200));
        assert_eq!(r.characteristics.as_deref(), Some("Boîte de vitesse: Manuelle | Énergie: Essence"));
        assert_eq!(r.equipment_options.as_deref(), Some("Climatisation | Bluetooth"));
        assert_eq!(r.seller_comment.as_deref(), Some("Première main.\nEntretien à jour."));
        assert_eq!(r.features.as_deref(), Some("Crit'Air 1 | Faible kilométrage"));
        assert_eq!(r.agency_name.as_deref(), Some("Garage du Centre"));
        assert_eq!(r.phone.as_deref(), Some("0472001122"));
        assert_eq!(r.resource_url, "u");
        assert_eq!(p.extras.warranty.as_deref(), Some("6 mois"));
        assert_eq!(p.extras.guarantees.as_deref(), Some("6 mois"));
        assert_eq!(
            p.extras.technical_sheet_url.as_deref(),
            Some("https://example.test/fiche-technique/c3")
        );
    }

    #[test]
    fn tel_link_when_no_digits_near_control() {
        let page = r#"<html><body><a href="tel:+33 4 72 00 11 22">Appeler</a></body></html>"#;
        let p = extract(page, "u", &ctx());
        assert_eq!(p.record.phone.as_deref(), Some("+33472001122"));
    }

    #[test]
    fn bare_page_yields_nothing() {
        let p = extract("<html><body><p>Rien</p></body></html>", "u", &ctx());
        assert!(p.record.is_empty());
        assert_eq!(p.extras, SupplementaryFields::default());
    }
}
