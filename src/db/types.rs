use std::fmt;

/// The two storage representations a quiz attempt can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Activity-log rows with key/value metadata.
    Legacy,
    /// Dedicated relational tables.
    Tables,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Tables => "tables",
        }
    }

    pub(crate) fn migrations_subdir(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Tables => "tables",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
