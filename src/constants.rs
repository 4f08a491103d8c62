//! Canonical URLs of the extensions the engine reads and writes.

pub const CPG_QUESTIONNAIRE_GENERATE: &str =
    "http://hl7.org/fhir/uv/cpg/StructureDefinition/cpg-questionnaire-generate";
pub const CPG_KNOWLEDGE_CAPABILITY: &str =
    "http://hl7.org/fhir/uv/cpg/StructureDefinition/cpg-knowledgeCapability";
pub const CPG_KNOWLEDGE_REPRESENTATION_LEVEL: &str =
    "http://hl7.org/fhir/uv/cpg/StructureDefinition/cpg-knowledgeRepresentationLevel";
pub const CQF_CQL_OPTIONS: &str = "http://hl7.org/fhir/StructureDefinition/cqf-cqlOptions";
pub const CQF_EXPANSION_PARAMETERS: &str =
    "http://hl7.org/fhir/StructureDefinition/cqf-expansionParameters";

pub const PERTAINS_TO_GOAL: &str =
    "http://hl7.org/fhir/StructureDefinition/resource-pertainsToGoal";
pub const EXT_CRMI_MESSAGES: &str = "http://hl7.org/fhir/StructureDefinition/crmi-messages";

pub const SDC_QUESTIONNAIRE_PREPOPULATE: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-prepopulate";
pub const SDC_QUESTIONNAIRE_PREPOPULATE_PARAMETER: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-prepopulate-parameter";
pub const SDC_QUESTIONNAIRE_LOOKUP_QUESTIONNAIRE: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-lookupQuestionnaire";

// Task annotations
pub const APHL_NEXT: &str = "http://hl7.org/fhir/aphl/StructureDefinition/next";
pub const APHL_OFFSET: &str = "http://hl7.org/fhir/aphl/StructureDefinition/offset";
pub const APHL_TARGET: &str = "http://hl7.org/fhir/aphl/StructureDefinition/target";
pub const APHL_CONDITION: &str = "http://hl7.org/fhir/aphl/StructureDefinition/condition";
pub const APHL_LANGUAGE: &str = "http://hl7.org/fhir/aphl/StructureDefinition/language";
pub const APHL_EXPRESSION: &str = "http://hl7.org/fhir/aphl/StructureDefinition/expression";
pub const APHL_INPUT: &str = "http://hl7.org/fhir/aphl/StructureDefinition/input";

pub const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

pub const DEFAULT_PACKAGE_OPERATION: &str = "questionnaire-package";
