//! Plural/singular handling for table-name matching.
//!
//! Wraps the `inflector` crate with a small table of irregular nouns that
//! show up in real schemas and that the generic rules get wrong.

use inflector::Inflector;

/// Irregular singular/plural pairs common in database naming.
static IRREGULARS: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("status", "statuses"),
    ("address", "addresses"),
    ("analysis", "analyses"),
    ("index", "indices"),
    ("matrix", "matrices"),
    ("vertex", "vertices"),
    ("criterion", "criteria"),
    ("datum", "data"),
    ("medium", "media"),
    ("category", "categories"),
    ("company", "companies"),
    ("country", "countries"),
    ("inventory", "inventories"),
];

/// Pluralize a word. Already-plural input is returned unchanged.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();
    for (singular, plural) in IRREGULARS {
        if lower == *singular || lower == *plural {
            return (*plural).to_string();
        }
    }
    lower.to_plural()
}

/// Singularize a word. Already-singular input is returned unchanged.
pub fn singularize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();
    for (singular, plural) in IRREGULARS {
        if lower == *singular || lower == *plural {
            return (*singular).to_string();
        }
    }
    lower.to_singular()
}

/// Whether `name` names the same noun as `stem`: equal, or the plural or
/// singular form of it.
pub fn names_match(stem: &str, name: &str) -> bool {
    if stem.is_empty() || name.is_empty() {
        return false;
    }
    let stem = stem.to_lowercase();
    let name = name.to_lowercase();
    stem == name || pluralize(&stem) == name || singularize(&name) == stem
}
