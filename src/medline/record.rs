use serde::{Serialize, Serializer};

use super::tags::Tag;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub tag: Tag,
    pub value: String,
}

/// One parsed citation: an ordered, multi-valued tag to value mapping.
///
/// Field order follows the input file, with derived fields appended after
/// the scanned ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tag: impl Into<Tag>, value: impl Into<String>) {
        self.fields.push(Field {
            tag: tag.into(),
            value: value.into(),
        });
    }

    /// First value stored under `tag`.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.tag == *tag)
            .map(|field| field.value.as_str())
    }

    pub fn get_all<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |field| field.tag == *tag)
            .map(|field| field.value.as_str())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.fields.iter().any(|field| field.tag == *tag)
    }

    /// Removes every value stored under `tag` and returns how many were dropped.
    pub fn remove_all(&mut self, tag: &str) -> usize {
        let before = self.fields.len();
        self.fields.retain(|field| field.tag != *tag);
        before - self.fields.len()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Drops all fields but keeps the allocation for reuse.
    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            self.fields
                .iter()
                .map(|field| (field.tag.as_str(), field.value.as_str())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_first_value_and_get_all_keeps_order() {
        let mut record = Record::new();
        record.add("MH", "Humans");
        record.add("PMID", "42");
        record.add("MH", "Diabetes Mellitus");

        assert_eq!(record.get("MH"), Some("Humans"));
        assert_eq!(
            record.get_all("MH").collect::<Vec<_>>(),
            vec!["Humans", "Diabetes Mellitus"]
        );
        assert_eq!(record.get("AB"), None);
    }

    #[test]
    fn remove_all_drops_every_value_for_tag() {
        let mut record = Record::new();
        record.add("OAB", "first");
        record.add("TI", "title");
        record.add("OAB", "second");

        assert_eq!(record.remove_all("OAB"), 2);
        assert!(!record.contains("OAB"));
        assert_eq!(record.len(), 1);
        assert_eq!(record.remove_all("OAB"), 0);
    }

    #[test]
    fn serializes_as_ordered_tag_value_pairs() {
        let mut record = Record::new();
        record.add("PMID", "123");
        record.add("XYZ", "opaque");

        let json = serde_json::to_string(&record).expect("record should serialize");
        assert_eq!(json, r#"[["PMID","123"],["XYZ","opaque"]]"#);
    }
}
