use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

use super::dom::CONTACT_LABELS;
use super::extract::phone;
use super::surface::{ElementHandle, Matcher, Surface};
use crate::error::RevealError;

static PAIRED_DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{2}(?:[\s.]+\d{2}){3,4}").unwrap());

/// Leaf elements longer than this are not scanned as a last resort.
const MAX_LEAF_CHARS: usize = 32;

/// How a number is read out of a matched element.
#[derive(Debug, Clone)]
pub enum ExtractionRule {
    /// Element text with a paired-digit run, normalised as a whole so a
    /// country prefix survives.
    PairedDigits,
    /// `href="tel:..."`.
    TelHref,
    /// Attribute holding the number, possibly base64.
    EncodedAttribute(&'static str),
}

impl ExtractionRule {
    fn apply(&self, surface: &dyn Surface, handle: ElementHandle) -> Option<String> {
        match self {
            ExtractionRule::PairedDigits => {
                let text = surface.read_text(handle)?;
                if !PAIRED_DIGITS_RE.is_match(&text) {
                    return None;
                }
                phone::normalize(&text)
            }
            ExtractionRule::TelHref => {
                let href = surface.read_attribute(handle, "href")?;
                phone::normalize(href.strip_prefix("tel:")?)
            }
            ExtractionRule::EncodedAttribute(name) => {
                let raw = surface.read_attribute(handle, name)?;
                let decoded = phone::decode_base64_text(&raw);
                phone::normalize(decoded.as_deref().unwrap_or(&raw))
            }
        }
    }
}

/// Ordered controls to click and ordered targets to read afterwards.
#[derive(Debug, Clone)]
pub struct RevealPlan {
    pub controls: Vec<Matcher>,
    pub targets: Vec<(Matcher, ExtractionRule)>,
    pub timeout: Duration,
}

impl RevealPlan {
    pub fn standard(timeout: Duration) -> Self {
        let mut controls = vec![
            Matcher::css(r#"button#summary-contact-phone[data-page-zone="telephone"]"#),
            Matcher::css("button#summary-contact-phone"),
            Matcher::css(r#"button[data-page-zone="telephone"]"#),
            Matcher::css("button.ContactInformation_phone__qlEra"),
        ];
        controls.extend(
            CONTACT_LABELS
                .iter()
                .map(|label| Matcher::css("button, a").containing(*label)),
        );

        let digits = |css: &str| {
            (
                Matcher::css(css).matching(PAIRED_DIGITS_RE.clone()),
                ExtractionRule::PairedDigits,
            )
        };
        let targets = vec![
            digits(r#"button[data-page-zone="telephone"] + span"#),
            digits(r#"button[data-page-zone="telephone"] span span"#),
            digits("#contactInfoWrapper span"),
            digits(".ContactInformation_phone__qlEra span"),
            (Matcher::css(r#"a[href^="tel:"]"#), ExtractionRule::TelHref),
            (Matcher::css("[data-phone]"), ExtractionRule::EncodedAttribute("data-phone")),
            digits("span"),
        ];

        RevealPlan {
            controls,
            targets,
            timeout,
        }
    }
}

/// Run the reveal protocol once. Every target wait draws from one deadline.
pub fn reveal_phone(surface: &mut dyn Surface, plan: &RevealPlan) -> Result<String, RevealError> {
    let Some(control) = plan.controls.iter().find_map(|m| surface.find_element(m)) else {
        return Err(RevealError::NoControl);
    };
    let pre_click = ExtractionRule::EncodedAttribute("data-phone").apply(&*surface, control);

    surface.click(control)?;
    let started = Instant::now();
    let deadline = started + plan.timeout;

    for (matcher, rule) in &plan.targets {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let Some(handle) = surface.wait_for(matcher, remaining) else {
            continue;
        };
        if let Some(number) = rule.apply(&*surface, handle) {
            debug!(target_css = %matcher.css, "phone revealed");
            return Ok(number);
        }
    }

    if let Some(number) = scan_short_leaves(&*surface) {
        debug!("phone found by leaf scan");
        return Ok(number);
    }
    if let Some(number) = pre_click {
        debug!("phone read from control attribute");
        return Ok(number);
    }

    Err(RevealError::Timeout {
        waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

fn scan_short_leaves(surface: &dyn Surface) -> Option<String> {
    surface
        .find_all(&Matcher::css("span, div, p, a, strong"))
        .into_iter()
        .filter_map(|h| surface.read_text(h))
        .filter(|t| t.chars().count() <= MAX_LEAF_CHARS)
        .filter(|t| PAIRED_DIGITS_RE.is_match(t))
        .find_map(|t| phone::normalize(&t))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::surface::StaticSurface;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    fn plan() -> RevealPlan {
        RevealPlan::standard(Duration::from_millis(50))
    }

    #[test]
    fn click_then_read_revealed_span() {
        let before = r#"<div id="contactInfoWrapper"><button id="summary-contact-phone" data-page-zone="telephone">N° téléphone</button></div>"#;
        let after = r#"<div id="contactInfoWrapper"><button id="summary-contact-phone" data-page-zone="telephone">N° téléphone</button><span>06 12 34 56 78</span></div>"#;
        let mut s = StaticSurface::new(before).with_revealed(after);
        assert_eq!(reveal_phone(&mut s, &plan()).unwrap(), "0612345678");
    }

    #[test]
    fn country_prefix_is_kept() {
        let before = r#"<button id="summary-contact-phone">Voir</button>"#;
        let after = r#"<div id="contactInfoWrapper"><span>+33 6 12 34 56 78</span></div>"#;
        let mut s = StaticSurface::new(before).with_revealed(after);
        assert_eq!(reveal_phone(&mut s, &plan()).unwrap(), "+33612345678");
    }

    #[test]
    fn leaf_scan_keeps_country_prefix() {
        let before = r#"<button id="summary-contact-phone">Voir</button>"#;
        let after = r#"<p>+33 4 78 12 34 56</p>"#;
        let mut s = StaticSurface::new(before).with_revealed(after);
        assert_eq!(reveal_phone(&mut s, &plan()).unwrap(), "+33478123456");
    }

    #[test]
    fn text_labelled_control_and_tel_link() {
        let before = r##"<a href="#">Afficher le numéro</a>"##;
        let after = r#"<a href="tel:0478123456">Appeler</a>"#;
        let mut s = StaticSurface::new(before).with_revealed(after);
        assert_eq!(reveal_phone(&mut s, &plan()).unwrap(), "0478123456");
    }

    #[test]
    fn encoded_attribute_on_control() {
        let markup = format!(
            r#"<button data-page-zone="telephone" data-phone="{}">Téléphone</button>"#,
            STANDARD.encode("0320112233")
        );
        let mut s = StaticSurface::new(&markup);
        assert_eq!(reveal_phone(&mut s, &plan()).unwrap(), "0320112233");
    }

    #[test]
    fn no_control_is_reported() {
        let mut s = StaticSurface::new("<p>06 12 34 56 78</p>");
        assert!(matches!(reveal_phone(&mut s, &plan()), Err(RevealError::NoControl)));
    }

    #[test]
    fn nothing_revealed_times_out() {
        let mut s = StaticSurface::new(r#"<button id="summary-contact-phone">Voir</button>"#);
        assert!(matches!(reveal_phone(&mut s, &plan()), Err(RevealError::Timeout { .. })));
    }

    #[test]
    fn long_text_blocks_are_not_leaf_candidates() {
        let after = r#"<button id="summary-contact-phone">x</button><p>Contactez-nous au sujet de ce véhicule au 06 12 34 56 78 ou par mail</p>"#;
        let mut s = StaticSurface::new(after).with_revealed(after);
        assert!(reveal_phone(&mut s, &plan()).is_err());
    }
}
