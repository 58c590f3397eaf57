//! CSS-selector extraction rules for HTML documents

use crate::config::{HtmlFieldConfig, TextMode};
use crate::extract::record::{clean_value, Record};
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};

/// A compiled field rule
#[derive(Debug, Clone)]
struct HtmlFieldRule {
    name: String,
    selector: Selector,
    mode: TextMode,
    attr: Option<String>,
}

/// Ordered field rules mapping one HTML document to one record
#[derive(Debug, Clone)]
pub struct HtmlRuleSet {
    fields: Vec<HtmlFieldRule>,
}

impl HtmlRuleSet {
    /// Compiles field rules from configuration
    ///
    /// # Returns
    ///
    /// * `Ok(HtmlRuleSet)` - All selectors parsed
    /// * `Err(ConfigError::InvalidSelector)` - A selector failed to parse
    pub fn compile(fields: &[HtmlFieldConfig]) -> Result<Self, ConfigError> {
        let fields = fields
            .iter()
            .map(|field| {
                let selector = Selector::parse(&field.selector).map_err(|e| {
                    ConfigError::InvalidSelector(format!("'{}': {:?}", field.selector, e))
                })?;
                Ok(HtmlFieldRule {
                    name: field.name.clone(),
                    selector,
                    mode: field.mode,
                    attr: field.attr.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { fields })
    }

    /// Extracts one record from a parsed document
    ///
    /// Every configured field is present in the result; a selector that
    /// matches nothing yields `None` for that field and never stops the
    /// remaining fields from being evaluated.
    pub fn extract(&self, document: &Html, url: &str) -> Record {
        let mut record = Record::new(url);
        for rule in &self.fields {
            record.set(&rule.name, evaluate(rule, document));
        }
        record
    }

    /// Parses `html` and extracts one record from it
    pub fn extract_str(&self, html: &str, url: &str) -> Record {
        let document = Html::parse_document(html);
        self.extract(&document, url)
    }
}

fn evaluate(rule: &HtmlFieldRule, document: &Html) -> Option<String> {
    let raw = match (&rule.attr, rule.mode) {
        (Some(attr), _) => document
            .select(&rule.selector)
            .find_map(|element| element.value().attr(attr))
            .map(str::to_string),
        (None, TextMode::Text) => document
            .select(&rule.selector)
            .next()
            .and_then(first_own_text),
        (None, TextMode::AllText) => Some(
            document
                .select(&rule.selector)
                .flat_map(|element| element.text())
                .collect::<String>(),
        ),
    };

    raw.as_deref().and_then(clean_value)
}

/// The first text node among the element's direct children
fn first_own_text(element: ElementRef) -> Option<String> {
    element
        .children()
        .find_map(|node| node.value().as_text().map(|text| (**text).to_string()))
}
