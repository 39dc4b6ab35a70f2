//! Attribute bundles attached to every type in the graph.
//!
//! Whenever two types are merged by a rewrite, their bundles are merged too.
//! Every field of [`Attributes`] combines as a set union (or a widening to
//! "unbounded" for case sets), so [`Attributes::merge`] is commutative and
//! associative and merges stay order-independent.

use std::collections::BTreeSet;

/// Case sets above this size never expand into enums; the bundle widens to
/// [`StringCases::Unbounded`] instead.
pub const MAX_ENUM_CASES: usize = 64;

/// The set of string values observed for a string type.
///
/// `Unbounded` means the set is open: either the string came from a schema
/// without an `enum` clause, or too many distinct samples were seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum StringCases {
    #[default]
    Unbounded,
    Cases(BTreeSet<String>),
}

impl StringCases {
    pub fn observed(case: impl Into<String>) -> Self {
        StringCases::Cases(BTreeSet::from([case.into()]))
    }

    pub fn from_set(cases: BTreeSet<String>) -> Self {
        match cases.len() > MAX_ENUM_CASES {
            true => StringCases::Unbounded,
            false => StringCases::Cases(cases),
        }
    }

    pub fn as_cases(&self) -> Option<&BTreeSet<String>> {
        match self {
            StringCases::Unbounded => None,
            StringCases::Cases(cases) => Some(cases),
        }
    }

    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (StringCases::Cases(mut a), StringCases::Cases(b)) => {
                a.extend(b);
                Self::from_set(a)
            }
            _ => StringCases::Unbounded,
        }
    }
}

/// Metadata carried alongside a type: where it came from and what to call it.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attributes {
    /// Names observed for this type: top-level names, schema titles,
    /// definition keys. Candidate inputs for name gathering.
    pub names: BTreeSet<String>,
    /// Human-readable descriptions (schema `description` clauses).
    pub descriptions: BTreeSet<String>,
    /// Indices of the input sources this type was inferred from.
    pub provenance: BTreeSet<usize>,
    /// For string types only: the observed value set, if still bounded.
    pub string_cases: StringCases,
}

impl Attributes {
    pub fn named(name: impl Into<String>) -> Self {
        Attributes {
            names: BTreeSet::from([name.into()]),
            ..Attributes::default()
        }
    }

    pub fn with_provenance(mut self, source: usize) -> Self {
        self.provenance.insert(source);
        self
    }

    pub fn with_cases(mut self, cases: StringCases) -> Self {
        self.string_cases = cases;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
            && self.descriptions.is_empty()
            && self.provenance.is_empty()
            && self.string_cases == StringCases::Unbounded
    }

    /// Commutative, associative combine. Set unions throughout; case sets
    /// widen to unbounded when either side is unbounded or the union grows
    /// past [`MAX_ENUM_CASES`].
    pub fn merge(mut self, other: Self) -> Self {
        self.names.extend(other.names);
        self.descriptions.extend(other.descriptions);
        self.provenance.extend(other.provenance);
        self.string_cases = std::mem::take(&mut self.string_cases).merge(other.string_cases);
        self
    }
}
