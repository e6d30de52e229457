//! FHIR reference and resource id parsing.
//!
//! Change events and compartment routing both work with `Type/id` strings.
//! This module turns those strings into a [`FhirReference`] and rejects the
//! forms that cannot point at a locally stored resource.
//!
//! # Example
//!
//! ```
//! use octofhir_core::fhir_reference::parse_reference;
//!
//! let reference = parse_reference("Patient/A/_history/3").unwrap();
//! assert_eq!(reference.resource_type, "Patient");
//! assert_eq!(reference.id, "A");
//! assert_eq!(reference.version.as_deref(), Some("3"));
//! ```

use std::fmt;

/// A successfully parsed local FHIR reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FhirReference {
    /// The resource type (e.g., "Patient", "Observation")
    pub resource_type: String,
    /// The logical id
    pub id: String,
    /// Optional version id from a `_history` suffix
    pub version: Option<String>,
}

impl FhirReference {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version: None,
        }
    }

    pub fn with_version(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version: Some(version.into()),
        }
    }

    /// `Type/id` without the version.
    pub fn to_versionless(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }

    /// `Type/id/_history/version` when a version is known, otherwise `Type/id`.
    pub fn to_versioned(&self) -> String {
        match &self.version {
            Some(v) => format!("{}/{}/_history/{}", self.resource_type, self.id, v),
            None => self.to_versionless(),
        }
    }

    /// Check whether this reference points at the given resource type.
    pub fn is_type(&self, resource_type: &str) -> bool {
        self.resource_type == resource_type
    }
}

impl fmt::Display for FhirReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_versioned())
    }
}

/// A reference that cannot be resolved against the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvableReference {
    /// A contained reference (starts with `#`)
    Contained(String),
    /// A URN reference (`urn:uuid:xxx` or `urn:oid:xxx`)
    Urn(String),
    /// An absolute URL
    External(String),
    /// A malformed reference
    Invalid(String),
}

impl fmt::Display for UnresolvableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contained(id) => write!(f, "contained reference: #{id}"),
            Self::Urn(urn) => write!(f, "URN reference: {urn}"),
            Self::External(url) => write!(f, "external reference: {url}"),
            Self::Invalid(reason) => write!(f, "invalid reference: {reason}"),
        }
    }
}

impl std::error::Error for UnresolvableReference {}

/// Parse a relative reference (`Type/id` or `Type/id/_history/v`).
pub fn parse_reference(reference: &str) -> Result<FhirReference, UnresolvableReference> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(UnresolvableReference::Invalid("empty reference".to_string()));
    }

    if let Some(contained_id) = reference.strip_prefix('#') {
        return Err(UnresolvableReference::Contained(contained_id.to_string()));
    }

    if reference.starts_with("urn:") {
        return Err(UnresolvableReference::Urn(reference.to_string()));
    }

    if reference.contains("://") {
        return Err(UnresolvableReference::External(reference.to_string()));
    }

    let parts: Vec<&str> = reference.split('/').collect();
    let [resource_type, id, rest @ ..] = parts.as_slice() else {
        return Err(UnresolvableReference::Invalid(format!(
            "reference must contain at least Type/id: {reference}"
        )));
    };

    if !resource_type
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_uppercase())
    {
        return Err(UnresolvableReference::Invalid(format!(
            "resource type must start with uppercase letter: {resource_type}"
        )));
    }

    if id.is_empty() {
        return Err(UnresolvableReference::Invalid(
            "resource id cannot be empty".to_string(),
        ));
    }

    let version = match rest {
        ["_history", version, ..] if !version.is_empty() => Some(version.to_string()),
        _ => None,
    };

    Ok(FhirReference {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_relative_reference() {
        let r = parse_reference("Patient/123").unwrap();
        assert_eq!(r.resource_type, "Patient");
        assert_eq!(r.id, "123");
        assert_eq!(r.version, None);
    }

    #[test]
    fn test_versioned_reference() {
        let r = parse_reference("Patient/123/_history/2").unwrap();
        assert_eq!(r.id, "123");
        assert_eq!(r.version, Some("2".to_string()));
        assert_eq!(r.to_versioned(), "Patient/123/_history/2");
        assert_eq!(r.to_versionless(), "Patient/123");
    }

    #[test]
    fn test_unresolvable_forms() {
        assert!(matches!(
            parse_reference("#contained-id"),
            Err(UnresolvableReference::Contained(id)) if id == "contained-id"
        ));
        assert!(matches!(
            parse_reference("urn:uuid:550e8400-e29b-41d4-a716-446655440000"),
            Err(UnresolvableReference::Urn(_))
        ));
        assert!(matches!(
            parse_reference("http://other.org/fhir/Patient/1"),
            Err(UnresolvableReference::External(_))
        ));
    }

    #[test]
    fn test_invalid_references() {
        assert!(matches!(
            parse_reference("patient/123"),
            Err(UnresolvableReference::Invalid(_))
        ));
        assert!(matches!(
            parse_reference("Patient/"),
            Err(UnresolvableReference::Invalid(_))
        ));
        assert!(matches!(
            parse_reference("Patient123"),
            Err(UnresolvableReference::Invalid(_))
        ));
        assert!(matches!(
            parse_reference("  "),
            Err(UnresolvableReference::Invalid(_))
        ));
    }

    #[test]
    fn test_is_type() {
        let r = FhirReference::new("Patient", "A");
        assert!(r.is_type("Patient"));
        assert!(!r.is_type("Person"));
        assert_eq!(format!("{r}"), "Patient/A");
    }
}
