use anyhow::{Context, Result};
use regex::Regex;

use super::date::DateParser;
use super::record::Record;
use super::tags::{
    ABSTRACT, DATE_DAY, MESH_CENTRAL, MESH_HEADING, MESH_QUALIFIER, OTHER_ABSTRACT,
    PUBLICATION_DATE, TITLE, TRANSLITERATED_TITLE,
};

/// Post-scan field derivations applied to every assembled record.
///
/// Running [`FieldDeriver::derive`] on an already derived record leaves it
/// unchanged: mined heading terms and the day field are replaced rather than
/// appended, and fallback promotion only fires while the primary tag is absent.
#[derive(Debug)]
pub struct FieldDeriver {
    qualifier: Regex,
    central: Regex,
    dates: DateParser,
}

impl FieldDeriver {
    pub fn new() -> Result<Self> {
        Ok(Self {
            qualifier: Regex::new(r"/([^*][^/]+)")
                .context("failed to compile heading qualifier regex")?,
            central: Regex::new(r"\*([^/]+)").context("failed to compile central term regex")?,
            dates: DateParser::new()?,
        })
    }

    pub fn derive(&self, record: &mut Record) {
        self.mine_headings(record);
        promote_fallback(record, ABSTRACT, OTHER_ABSTRACT);
        promote_fallback(record, TITLE, TRANSLITERATED_TITLE);
        self.synthesize_day(record);
    }

    fn mine_headings(&self, record: &mut Record) {
        let mut qualifiers = Vec::new();
        let mut centrals = Vec::new();
        for heading in record.get_all(MESH_HEADING) {
            qualifiers.extend(capture_all(&self.qualifier, heading));
            centrals.extend(capture_all(&self.central, heading));
        }

        replace_values(record, MESH_QUALIFIER, qualifiers);
        replace_values(record, MESH_CENTRAL, centrals);
    }

    fn synthesize_day(&self, record: &mut Record) {
        let Some(published) = record.get(PUBLICATION_DATE) else {
            return;
        };
        let day = self.dates.parse(published).epoch_day_millis().to_string();

        replace_values(record, DATE_DAY, vec![day]);
    }
}

/// Sets `tag` to exactly `values`, leaving the record untouched when it
/// already holds them.
fn replace_values(record: &mut Record, tag: &str, values: Vec<String>) {
    if record.get_all(tag).eq(values.iter().map(String::as_str)) {
        return;
    }

    record.remove_all(tag);
    for value in values {
        record.add(tag, value);
    }
}

fn capture_all(pattern: &Regex, value: &str) -> Vec<String> {
    pattern
        .captures_iter(value)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn promote_fallback(record: &mut Record, primary: &str, fallback: &str) {
    if record.contains(primary) {
        return;
    }
    let Some(value) = record.get(fallback).map(str::to_owned) else {
        return;
    };

    record.add(primary, value);
    record.remove_all(fallback);
}
