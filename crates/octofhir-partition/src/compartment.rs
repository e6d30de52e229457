//! Compartment definitions used for partition routing.
//!
//! A compartment groups every resource that points at one owner resource
//! (e.g. all Observations whose `subject` is `Patient/A`). For each member
//! type the definition lists the element paths holding such references.
//! Paths are dotted element names (`performer.actor`); arrays are walked
//! transparently.

use std::collections::HashMap;

use serde_json::Value;

use octofhir_core::{FhirReference, parse_reference};

/// Marks the owner type itself: membership comes from its own id.
const SELF_INCLUSION: &str = "{def}";

// Element paths per member type, Patient compartment (R4).
const PATIENT_COMPARTMENT: &[(&str, &[&str])] = &[
    ("Patient", &[SELF_INCLUSION]),
    ("Account", &["subject"]),
    ("AllergyIntolerance", &["patient", "recorder", "asserter"]),
    ("Appointment", &["participant.actor"]),
    ("AppointmentResponse", &["actor"]),
    ("AuditEvent", &["entity.what"]),
    ("Basic", &["subject", "author"]),
    ("BodyStructure", &["patient"]),
    ("CarePlan", &["subject", "activity.detail.performer"]),
    ("CareTeam", &["subject", "participant.member"]),
    ("ChargeItem", &["subject", "enterer", "performer.actor"]),
    ("Claim", &["patient", "payee.party"]),
    ("ClaimResponse", &["patient"]),
    ("ClinicalImpression", &["subject"]),
    ("Communication", &["subject", "sender", "recipient"]),
    ("CommunicationRequest", &["subject", "sender", "recipient", "requester"]),
    ("Composition", &["subject", "author", "attester.party"]),
    ("Condition", &["subject", "asserter"]),
    ("Consent", &["patient"]),
    ("Coverage", &["policyHolder", "subscriber", "beneficiary", "payor"]),
    ("DetectedIssue", &["patient"]),
    ("DeviceRequest", &["subject", "performer"]),
    ("DeviceUseStatement", &["subject"]),
    ("DiagnosticReport", &["subject"]),
    ("DocumentManifest", &["subject", "author", "recipient"]),
    ("DocumentReference", &["subject", "author"]),
    ("Encounter", &["subject"]),
    ("EnrollmentRequest", &["candidate"]),
    ("EpisodeOfCare", &["patient"]),
    ("ExplanationOfBenefit", &["patient", "payee.party"]),
    ("FamilyMemberHistory", &["patient"]),
    ("Flag", &["subject"]),
    ("Goal", &["subject"]),
    ("Group", &["member.entity"]),
    ("ImagingStudy", &["subject"]),
    ("Immunization", &["patient"]),
    ("ImmunizationEvaluation", &["patient"]),
    ("ImmunizationRecommendation", &["patient"]),
    ("Invoice", &["subject", "recipient"]),
    ("List", &["subject", "source"]),
    ("MeasureReport", &["subject"]),
    ("Media", &["subject"]),
    ("MedicationAdministration", &["subject", "performer.actor"]),
    ("MedicationDispense", &["subject", "receiver", "performer.actor"]),
    ("MedicationRequest", &["subject"]),
    ("MedicationStatement", &["subject", "informationSource"]),
    ("MolecularSequence", &["patient"]),
    ("NutritionOrder", &["patient"]),
    ("Observation", &["subject", "performer"]),
    ("Procedure", &["subject", "performer.actor"]),
    ("Provenance", &["target"]),
    ("QuestionnaireResponse", &["subject", "author", "source"]),
    ("RelatedPerson", &["patient"]),
    ("RequestGroup", &["subject", "action.participant"]),
    ("ResearchSubject", &["individual"]),
    ("RiskAssessment", &["subject"]),
    ("Schedule", &["actor"]),
    ("ServiceRequest", &["subject", "performer"]),
    ("Specimen", &["subject"]),
    ("SupplyDelivery", &["patient"]),
    ("SupplyRequest", &["deliverTo"]),
    ("VisionPrescription", &["patient"]),
];

// Practitioner compartment (R4), the commonly partitioned subset.
const PRACTITIONER_COMPARTMENT: &[(&str, &[&str])] = &[
    ("Practitioner", &[SELF_INCLUSION]),
    ("Appointment", &["participant.actor"]),
    ("CareTeam", &["participant.member"]),
    ("Composition", &["subject", "author", "attester.party"]),
    ("Condition", &["asserter"]),
    ("DiagnosticReport", &["performer"]),
    ("Encounter", &["participant.individual"]),
    ("Immunization", &["performer.actor"]),
    ("MedicationRequest", &["requester"]),
    ("Observation", &["performer"]),
    ("Procedure", &["performer.actor"]),
    ("Schedule", &["actor"]),
    ("ServiceRequest", &["performer", "requester"]),
    ("Task", &["owner", "requester"]),
];

/// A compartment: owner type plus member types and their reference paths.
#[derive(Debug, Clone)]
pub struct CompartmentDefinition {
    /// Owner type (e.g. "Patient").
    pub code: String,
    resources: HashMap<String, Vec<String>>,
}

impl CompartmentDefinition {
    fn from_table(code: &str, table: &[(&str, &[&str])]) -> Self {
        let resources = table
            .iter()
            .map(|(rt, paths)| {
                (
                    (*rt).to_string(),
                    paths.iter().map(|p| (*p).to_string()).collect(),
                )
            })
            .collect();
        Self {
            code: code.to_string(),
            resources,
        }
    }

    /// The standard Patient compartment.
    #[must_use]
    pub fn patient() -> Self {
        Self::from_table("Patient", PATIENT_COMPARTMENT)
    }

    /// The standard Practitioner compartment.
    #[must_use]
    pub fn practitioner() -> Self {
        Self::from_table("Practitioner", PRACTITIONER_COMPARTMENT)
    }

    /// Look up a compartment by owner type.
    pub fn for_code(code: &str) -> Option<Self> {
        match code {
            "Patient" => Some(Self::patient()),
            "Practitioner" => Some(Self::practitioner()),
            _ => None,
        }
    }

    /// Whether `resource_type` owns this compartment.
    pub fn is_owner(&self, resource_type: &str) -> bool {
        self.code == resource_type
    }

    /// Whether `resource_type` belongs to this compartment (owner included).
    pub fn includes_resource_type(&self, resource_type: &str) -> bool {
        self.resources.contains_key(resource_type)
    }

    /// Reference paths for a member type; empty for the owner and non-members.
    pub fn inclusion_paths(&self, resource_type: &str) -> &[String] {
        match self.resources.get(resource_type) {
            Some(paths) if !self.is_owner(resource_type) => paths.as_slice(),
            _ => &[],
        }
    }

    /// Search parameter names that can carry an owner reference for `resource_type`.
    ///
    /// The first segment of each inclusion path, plus the lower-cased owner
    /// type (`patient`) as the conventional alias.
    pub fn search_params(&self, resource_type: &str) -> Vec<String> {
        let mut params: Vec<String> = self
            .inclusion_paths(resource_type)
            .iter()
            .filter_map(|p| p.split('.').next())
            .map(str::to_string)
            .collect();
        let alias = self.code.to_lowercase();
        if !params.is_empty() && !params.contains(&alias) {
            params.push(alias);
        }
        params
    }

    /// Owner references carried by a member resource, in path order.
    pub fn owner_references(&self, resource_type: &str, resource: &Value) -> Vec<FhirReference> {
        let mut refs = Vec::new();
        for path in self.inclusion_paths(resource_type) {
            let mut nodes = Vec::new();
            walk(resource, path.split('.'), &mut nodes);
            refs.extend(
                nodes
                    .into_iter()
                    .filter_map(|node| node.get("reference").and_then(Value::as_str))
                    .filter_map(|r| parse_reference(r).ok())
                    .filter(|r| r.is_type(&self.code)),
            );
        }
        refs
    }
}

fn walk<'a>(value: &'a Value, mut segments: std::str::Split<'_, char>, out: &mut Vec<&'a Value>) {
    if let Value::Array(items) = value {
        for item in items {
            walk(item, segments.clone(), out);
        }
        return;
    }
    match segments.next() {
        None => out.push(value),
        Some(segment) => {
            if let Some(child) = value.get(segment) {
                walk(child, segments, out);
            }
        }
    }
}
