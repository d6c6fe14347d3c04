use std::fmt;

/// Exchange server versions an account can be configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeVersion {
    Exchange2007Sp1,
    Exchange2010,
    Exchange2010Sp1,
    #[default]
    Exchange2010Sp2,
}

impl ExchangeVersion {
    /// Parse an operator-facing label. Unknown or missing labels mean the
    /// newest supported version.
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some("2007 SP1") => ExchangeVersion::Exchange2007Sp1,
            Some("2010") => ExchangeVersion::Exchange2010,
            Some("2010 SP1") => ExchangeVersion::Exchange2010Sp1,
            _ => ExchangeVersion::Exchange2010Sp2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExchangeVersion::Exchange2007Sp1 => "2007 SP1",
            ExchangeVersion::Exchange2010 => "2010",
            ExchangeVersion::Exchange2010Sp1 => "2010 SP1",
            ExchangeVersion::Exchange2010Sp2 => "2010 SP2",
        }
    }

    /// Value of the `RequestServerVersion` SOAP header
    pub fn schema_name(&self) -> &'static str {
        match self {
            ExchangeVersion::Exchange2007Sp1 => "Exchange2007_SP1",
            ExchangeVersion::Exchange2010 => "Exchange2010",
            ExchangeVersion::Exchange2010Sp1 => "Exchange2010_SP1",
            ExchangeVersion::Exchange2010Sp2 => "Exchange2010_SP2",
        }
    }
}

impl fmt::Display for ExchangeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
