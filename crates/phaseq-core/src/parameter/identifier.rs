use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Possible variants to identify a substance.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierOption {
    Cas,
    Name,
}

impl fmt::Display for IdentifierOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let str = match self {
            IdentifierOption::Cas => "CAS",
            IdentifierOption::Name => "name",
        };
        write!(f, "{str}")
    }
}

/// A collection of identifiers for a chemical substance.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Identifier {
    /// CAS number
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cas: Option<String>,
    /// Commonly used english name
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Name in the language of the user interface
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub localized_name: Option<String>,
    /// Chemical formula
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

impl Identifier {
    /// Create a new identifier.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use phaseq_core::parameter::Identifier;
    /// let acetone = Identifier::new(
    ///     Some("67-64-1"),
    ///     Some("Acetone"),
    ///     Some("Acetona"),
    ///     Some("C3H6O")
    /// );
    /// ```
    pub fn new(
        cas: Option<&str>,
        name: Option<&str>,
        localized_name: Option<&str>,
        formula: Option<&str>,
    ) -> Identifier {
        Identifier {
            cas: cas.map(Into::into),
            name: name.map(Into::into),
            localized_name: localized_name.map(Into::into),
            formula: formula.map(Into::into),
        }
    }

    /// Identifier that only consists of a name.
    pub fn from_name(name: &str) -> Identifier {
        Identifier {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn as_str(&self, option: IdentifierOption) -> Option<&str> {
        match option {
            IdentifierOption::Cas => self.cas.as_deref(),
            IdentifierOption::Name => self.name.as_deref(),
        }
    }

    // returns the first available identifier in a somewhat arbitrary
    // prioritization. Used for readable outputs.
    pub fn as_readable_str(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.localized_name.as_deref())
            .or(self.cas.as_deref())
            .or(self.formula.as_deref())
    }

    /// Readable name that is never empty.
    pub fn label(&self) -> String {
        self.as_readable_str().unwrap_or("unnamed").to_string()
    }

    /// Case-insensitive comparison against the CAS number and both names.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        [&self.cas, &self.name, &self.localized_name]
            .into_iter()
            .flatten()
            .any(|id| id.to_lowercase() == query)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids = Vec::new();
        if let Some(n) = &self.cas {
            ids.push(format!("cas={n}"));
        }
        if let Some(n) = &self.name {
            ids.push(format!("name={n}"));
        }
        if let Some(n) = &self.localized_name {
            ids.push(format!("localized_name={n}"));
        }
        if let Some(n) = &self.formula {
            ids.push(format!("formula={n}"));
        }
        write!(f, "Identifier({})", ids.join(", "))
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.cas == other.cas && self.name == other.name
    }
}
impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cas.hash(state);
        self.name.hash(state);
    }
}
