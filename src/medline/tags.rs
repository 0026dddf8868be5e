use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use serde::{Serialize, Serializer};

pub const PMID: &str = "PMID";
pub const ABSTRACT: &str = "AB";
pub const OTHER_ABSTRACT: &str = "OAB";
pub const TITLE: &str = "TI";
pub const TRANSLITERATED_TITLE: &str = "TT";
pub const MESH_HEADING: &str = "MH";
pub const PUBLICATION_DATE: &str = "DP";

// Parser-generated tags; never read from input files.
pub const MESH_QUALIFIER: &str = "MQ";
pub const MESH_CENTRAL: &str = "MC";
pub const DATE_DAY: &str = "DT";

pub const DERIVED_TAGS: [&str; 3] = [MESH_QUALIFIER, MESH_CENTRAL, DATE_DAY];

/// Administrative tags dropped while scanning a record.
pub const IGNORED_TAGS: &[&str] = &[
    "IRAD", "BTI", "CTI", "CN", "CRDT", "DCOM", "DA", "LR", "DEP", "EN", "ED", "FED", "EDAT",
    "GS", "GN", "GR", "IR", "FIR", "ISBN", "IS", "TA", "LID", "MID", "JID", "OCI", "OID", "OTO",
    "OWN", "PS", "FPS", "PL", "PHST", "PT", "PUBM", "PMCR", "STAT", "VI", "VTI",
];

const KNOWN_TAGS: &[&str] = &[
    "AB", "AD", "AID", "AU", "AUID", "BTI", "CI", "CIN", "CN", "COIS", "CON", "CP", "CRDT", "CRF",
    "CRI", "CTDT", "CTI", "DA", "DCOM", "DDIN", "DEP", "DP", "DRIN", "ECF", "ECI", "ED", "EDAT",
    "EFR", "EIN", "EN", "ERR", "FAU", "FED", "FIR", "FPS", "GN", "GR", "GS", "IP", "IR", "IRAD",
    "IS", "ISBN", "JID", "JT", "LA", "LID", "LR", "MH", "MHDA", "MID", "NM", "OAB", "OABL", "OCI",
    "OID", "ORI", "OT", "OTO", "OWN", "PB", "PG", "PHST", "PL", "PMC", "PMCR", "PMID", "PS", "PST",
    "PT", "PUBM", "RF", "RIN", "RN", "ROF", "RPF", "RPI", "RRF", "RRI", "SB", "SFM", "SI", "SO",
    "SPIN", "STAT", "TA", "TI", "TT", "UIN", "UOF", "VI", "VTI", MESH_QUALIFIER, MESH_CENTRAL,
    DATE_DAY,
];

static KNOWN: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| KNOWN_TAGS.iter().copied().collect());

/// A record field tag, resolved against the closed set of MEDLINE tags.
///
/// Tags outside the known set are kept verbatim so that records carrying
/// newer or site-specific fields still round-trip through the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Known(&'static str),
    Unknown(String),
}

impl Tag {
    pub fn parse(raw: &str) -> Self {
        match KNOWN.get(raw) {
            Some(tag) => Self::Known(tag),
            None => Self::Unknown(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(tag) => tag,
            Self::Unknown(tag) => tag,
        }
    }

    pub fn is_derived(&self) -> bool {
        DERIVED_TAGS.contains(&self.as_str())
    }
}

impl From<&str> for Tag {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl PartialEq<str> for Tag {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
