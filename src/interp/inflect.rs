//! Singular/plural name forms for table resolution.

use std::fmt::Debug;

/// Produces the singular and plural forms of a resource name.
pub trait Inflector: Send + Sync + Debug {
    fn singular(&self, word: &str) -> String;
    fn plural(&self, word: &str) -> String;
}

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
];

const UNCOUNTABLE: &[&str] = &["data", "metadata", "information", "equipment", "series", "news"];

/// Rule-based English inflection covering the common regular forms.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnglishInflector;

impl Inflector for EnglishInflector {
    fn singular(&self, word: &str) -> String {
        let lower = word.to_ascii_lowercase();
        if UNCOUNTABLE.contains(&lower.as_str()) {
            return word.to_string();
        }
        if let Some((one, _)) = IRREGULAR.iter().find(|(_, many)| *many == lower) {
            return (*one).to_string();
        }
        if lower.ends_with("ies") && lower.len() > 3 {
            return format!("{}y", &word[..word.len() - 3]);
        }
        if ["sses", "shes", "ches", "xes", "zes"]
            .iter()
            .any(|suffix| lower.ends_with(suffix))
        {
            return word[..word.len() - 2].to_string();
        }
        if lower.ends_with('s') && !lower.ends_with("ss") && lower.len() > 1 {
            return word[..word.len() - 1].to_string();
        }
        word.to_string()
    }

    fn plural(&self, word: &str) -> String {
        let lower = word.to_ascii_lowercase();
        if UNCOUNTABLE.contains(&lower.as_str()) {
            return word.to_string();
        }
        if let Some((_, many)) = IRREGULAR.iter().find(|(one, _)| *one == lower) {
            return (*many).to_string();
        }
        let consonant_y = lower.ends_with('y')
            && lower
                .chars()
                .rev()
                .nth(1)
                .is_some_and(|c| !"aeiou".contains(c));
        if consonant_y {
            return format!("{}ies", &word[..word.len() - 1]);
        }
        if ["s", "sh", "ch", "x", "z"].iter().any(|suffix| lower.ends_with(suffix)) {
            return format!("{word}es");
        }
        format!("{word}s")
    }
}
