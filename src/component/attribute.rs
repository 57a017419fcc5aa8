//! Transaction attributes and the method metadata they are resolved from.

use std::str::FromStr;

/// Container-managed transaction attribute of a business method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionAttribute {
    Mandatory,
    Never,
    NotSupported,
    Required,
    RequiresNew,
    Supports,
}

impl TransactionAttribute {
    pub const ALL: [TransactionAttribute; 6] = [
        Self::Mandatory,
        Self::Never,
        Self::NotSupported,
        Self::Required,
        Self::RequiresNew,
        Self::Supports,
    ];
}

impl std::fmt::Display for TransactionAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Mandatory => "MANDATORY",
            Self::Never => "NEVER",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::Required => "REQUIRED",
            Self::RequiresNew => "REQUIRES_NEW",
            Self::Supports => "SUPPORTS",
        };
        f.write_str(name)
    }
}

impl FromStr for TransactionAttribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "MANDATORY" => Ok(Self::Mandatory),
            "NEVER" => Ok(Self::Never),
            "NOT_SUPPORTED" => Ok(Self::NotSupported),
            "REQUIRED" => Ok(Self::Required),
            "REQUIRES_NEW" => Ok(Self::RequiresNew),
            "SUPPORTS" => Ok(Self::Supports),
            other => Err(format!("Unknown transaction attribute: {}", other)),
        }
    }
}

/// Which view of the component an invocation came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    Remote,
    Local,
    /// Calls made by the container on the bean class itself (lifecycle callbacks).
    Bean,
    Timer,
}

/// Identifies a business method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(String);

impl MethodId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MethodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MethodId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Resolved transaction metadata for one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodTransaction {
    pub attribute: TransactionAttribute,
    /// Timeout override in seconds; `None` keeps the manager's setting.
    pub timeout: Option<u32>,
}

impl MethodTransaction {
    pub fn new(attribute: TransactionAttribute) -> Self {
        Self {
            attribute,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.timeout = Some(seconds);
        self
    }
}

impl Default for MethodTransaction {
    fn default() -> Self {
        Self::new(TransactionAttribute::Required)
    }
}
