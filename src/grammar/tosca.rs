//! Built-in grammar versions
//!
//! `tosca_2_0` owns the canonical readers. Each older version delegates to
//! the next newer one and suppresses whatever its predecessor added:
//!
//! | version                  | Policy                                     | TriggerDefinition |
//! |--------------------------|--------------------------------------------|-------------------|
//! | `tosca_2_0`              | canonical                                  | canonical         |
//! | `tosca_simple_yaml_1_3`  | → 2.0                                      | → 2.0             |
//! | `tosca_simple_yaml_1_2`  | → 1.3 without Metadata, TriggerDefinitions |                   |
//! | `tosca_simple_yaml_1_1`  | → 1.2                                      |                   |

use std::collections::BTreeMap;

use profile_types::ProfileValue;
use serde::Serialize;
use tracing::warn;

use super::{read_entities, Field, FieldProblem, GrammarRegistry, Problems, ReadContext};
use crate::catalog::document::DEFINITIONS_VERSION_KEY;
use crate::error::GrammarError;

pub const TOSCA_2_0: &str = "tosca_2_0";
pub const TOSCA_SIMPLE_YAML_1_3: &str = "tosca_simple_yaml_1_3";
pub const TOSCA_SIMPLE_YAML_1_2: &str = "tosca_simple_yaml_1_2";
pub const TOSCA_SIMPLE_YAML_1_1: &str = "tosca_simple_yaml_1_1";

/// Entity kinds
pub const POLICY: &str = "Policy";
pub const TRIGGER_DEFINITION: &str = "TriggerDefinition";

// ── Fields ───────────────────────────────────────────────────────────

const TYPE: Field = Field::new("Type", "type");
const DESCRIPTION: Field = Field::new("Description", "description");
const METADATA: Field = Field::new("Metadata", "metadata");
const PROPERTIES: Field = Field::new("Properties", "properties");
const TARGETS: Field = Field::new("Targets", "targets");
const TRIGGER_DEFINITIONS: Field = Field::new("TriggerDefinitions", "triggers");

const EVENT: Field = Field::new("Event", "event");
const CONDITION: Field = Field::new("Condition", "condition");
const ACTION: Field = Field::new("Action", "action");

// ── Entities ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<ProfileValue>,
    pub action: Vec<ProfileValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Policy {
    pub name: String,
    pub policy_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub properties: Vec<(String, ProfileValue)>,
    pub targets: Vec<String>,
    pub triggers: Vec<TriggerDefinition>,
}

impl Policy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy_type: String::new(),
            description: None,
            metadata: BTreeMap::new(),
            properties: Vec::new(),
            targets: Vec::new(),
            triggers: Vec::new(),
        }
    }

    pub fn trigger(&self, name: &str) -> Option<&TriggerDefinition> {
        self.triggers.iter().find(|t| t.name == name)
    }
}

/// Anything the built-in readers produce
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Entity {
    Policy(Policy),
    Trigger(TriggerDefinition),
}

impl Entity {
    pub fn kind(&self) -> &'static str {
        match self {
            Entity::Policy(_) => POLICY,
            Entity::Trigger(_) => TRIGGER_DEFINITION,
        }
    }

    pub fn into_policy(self) -> Option<Policy> {
        match self {
            Entity::Policy(policy) => Some(policy),
            _ => None,
        }
    }

    pub fn into_trigger(self) -> Option<TriggerDefinition> {
        match self {
            Entity::Trigger(trigger) => Some(trigger),
            _ => None,
        }
    }
}

// ── Canonical readers ────────────────────────────────────────────────

fn read_policy(
    registry: &GrammarRegistry<Entity>,
    ctx: &mut ReadContext,
) -> Result<Entity, GrammarError> {
    let mut policy = Policy::new(ctx.name());
    if !ctx.expect_mapping() {
        return Ok(Entity::Policy(policy));
    }

    policy.policy_type = ctx.take_required_string(&TYPE).unwrap_or_default();
    policy.description = ctx.take_string(&DESCRIPTION);
    policy.metadata = ctx.take_string_map(&METADATA);
    policy.properties = ctx.take_value_map(&PROPERTIES);
    policy.targets = ctx.take_string_list(&TARGETS);

    for (name, body) in ctx.take_value_map(&TRIGGER_DEFINITIONS) {
        let mut child = ctx.child(name, body);
        let entity = registry.read(ctx.version(), TRIGGER_DEFINITION, &mut child)?;
        match entity.into_trigger() {
            Some(trigger) => policy.triggers.push(trigger),
            None => warn!(path = child.path(), "Trigger reader returned another entity kind"),
        }
    }

    ctx.report_unknown_fields();
    Ok(Entity::Policy(policy))
}

fn read_trigger(_: &GrammarRegistry<Entity>, ctx: &mut ReadContext) -> Result<Entity, GrammarError> {
    let mut trigger = TriggerDefinition {
        name: ctx.name().to_string(),
        description: None,
        event: String::new(),
        condition: None,
        action: Vec::new(),
    };
    if !ctx.expect_mapping() {
        return Ok(Entity::Trigger(trigger));
    }

    trigger.description = ctx.take_string(&DESCRIPTION);
    trigger.event = ctx.take_required_string(&EVENT).unwrap_or_default();
    trigger.condition = ctx.take(&CONDITION);
    trigger.action = match ctx.take(&ACTION) {
        None => Vec::new(),
        Some(ProfileValue::Sequence(steps)) => steps,
        Some(step) => vec![step],
    };

    ctx.report_unknown_fields();
    Ok(Entity::Trigger(trigger))
}

// ── Registry ─────────────────────────────────────────────────────────

/// Registry with every built-in grammar version
pub fn builtin_registry() -> Result<GrammarRegistry<Entity>, GrammarError> {
    let mut builder = GrammarRegistry::<Entity>::builder();
    builder
        .register(TOSCA_2_0, POLICY, read_policy)?
        .register(TOSCA_2_0, TRIGGER_DEFINITION, read_trigger)?
        .register_delegate(TOSCA_SIMPLE_YAML_1_3, POLICY, &[], TOSCA_2_0)?
        .register_delegate(TOSCA_SIMPLE_YAML_1_3, TRIGGER_DEFINITION, &[], TOSCA_2_0)?
        .register_delegate(
            TOSCA_SIMPLE_YAML_1_2,
            POLICY,
            &[METADATA.name, TRIGGER_DEFINITIONS.name],
            TOSCA_SIMPLE_YAML_1_3,
        )?
        .register_delegate(TOSCA_SIMPLE_YAML_1_1, POLICY, &[], TOSCA_SIMPLE_YAML_1_2)?;
    Ok(builder.build())
}

// ── Documents ────────────────────────────────────────────────────────

/// Grammar version declared by a document
pub fn detect_version(document: &ProfileValue) -> Option<&str> {
    document.get(DEFINITIONS_VERSION_KEY)?.as_str()
}

/// Read the policies of a service template document.
///
/// 2.0 documents keep them under `service_template`, older ones under
/// `topology_template`. A document without a version yields no policies and
/// one recorded problem; a version nobody registered is a
/// [`GrammarError::UnknownVersion`].
pub fn read_policies(
    registry: &GrammarRegistry<Entity>,
    document_name: &str,
    document: &ProfileValue,
    problems: &Problems,
) -> Result<Vec<Policy>, GrammarError> {
    let Some(version) = detect_version(document) else {
        let mut ctx = ReadContext::new(document_name, document.clone(), "", problems.clone());
        ctx.enter_kind("ServiceTemplate");
        ctx.report(DEFINITIONS_VERSION_KEY, FieldProblem::Missing);
        return Ok(Vec::new());
    };
    if !registry.has_version(version) {
        return Err(GrammarError::UnknownVersion(version.to_string()));
    }

    let template_key = if version == TOSCA_2_0 {
        "service_template"
    } else {
        "topology_template"
    };
    let Some(section) = document.get(template_key).and_then(|t| t.get("policies")) else {
        return Ok(Vec::new());
    };

    let path = format!("{document_name}.{template_key}.policies");
    let entities = read_entities(registry, version, POLICY, &path, section, problems)?;
    Ok(entities.into_iter().filter_map(Entity::into_policy).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{C_GRAMMAR_UNKNOWN_VERSION, D_FIELD_MISSING, D_FIELD_UNSUPPORTED};
    use crate::grammar::DocumentFieldError;
    use pretty_assertions::assert_eq;

    const AUTOSCALE: &str = r#"
type: tosca.policies.Scaling
description: scale out on load
metadata:
  owner: platform
properties:
  min_instances: 1
targets: [web]
triggers:
  high_load:
    event: load_high
    condition: {cpu: 80}
    action:
      - scale: {delta: 1}
"#;

    fn read(version: &str, text: &str) -> (Policy, Vec<DocumentFieldError>) {
        let registry = builtin_registry().unwrap();
        let problems = Problems::new();
        let node = serde_yaml::from_str(text).unwrap();
        let mut ctx = ReadContext::new("autoscale", node, version, problems.clone());
        let policy = registry
            .read(version, POLICY, &mut ctx)
            .unwrap()
            .into_policy()
            .unwrap();
        (policy, problems.take())
    }

    #[test]
    fn test_canonical_policy() {
        let (policy, problems) = read(TOSCA_2_0, AUTOSCALE);
        assert!(problems.is_empty(), "{problems:?}");
        assert_eq!(policy.policy_type, "tosca.policies.Scaling");
        assert_eq!(policy.metadata.get("owner").map(String::as_str), Some("platform"));
        assert_eq!(policy.targets, vec!["web"]);
        let trigger = policy.trigger("high_load").unwrap();
        assert_eq!(trigger.event, "load_high");
        assert_eq!(trigger.action.len(), 1);
    }

    #[test]
    fn test_simple_yaml_1_3_reads_everything() {
        let (policy, problems) = read(TOSCA_SIMPLE_YAML_1_3, AUTOSCALE);
        assert!(problems.is_empty());
        assert_eq!(policy.triggers.len(), 1);
        assert_eq!(policy.metadata.len(), 1);
    }

    #[test]
    fn test_simple_yaml_1_2_suppresses_newer_fields() {
        let (policy, problems) = read(TOSCA_SIMPLE_YAML_1_2, AUTOSCALE);
        assert!(policy.metadata.is_empty());
        assert!(policy.triggers.is_empty());
        assert_eq!(policy.targets, vec!["web"]);

        let fields: Vec<_> = problems.iter().map(|p| p.field.as_str()).collect();
        assert_eq!(fields, vec!["metadata", "triggers"]);
        assert!(problems.iter().all(|p| p.code() == D_FIELD_UNSUPPORTED));
        assert!(problems.iter().all(|p| p.version == TOSCA_SIMPLE_YAML_1_2));
    }

    #[test]
    fn test_simple_yaml_1_1_nests_delegation() {
        let (_, problems) = read(TOSCA_SIMPLE_YAML_1_1, AUTOSCALE);
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn test_no_trigger_reader_below_1_3() {
        let registry = builtin_registry().unwrap();
        assert!(registry.supports(TOSCA_SIMPLE_YAML_1_3, TRIGGER_DEFINITION));
        assert!(!registry.supports(TOSCA_SIMPLE_YAML_1_2, TRIGGER_DEFINITION));
        assert_eq!(
            registry.versions().collect::<Vec<_>>(),
            vec![TOSCA_2_0, TOSCA_SIMPLE_YAML_1_1, TOSCA_SIMPLE_YAML_1_2, TOSCA_SIMPLE_YAML_1_3]
        );
    }

    #[test]
    fn test_read_policies_from_document() {
        let registry = builtin_registry().unwrap();
        let problems = Problems::new();
        let document: ProfileValue = serde_yaml::from_str(
            r#"
tosca_definitions_version: tosca_simple_yaml_1_2
topology_template:
  policies:
    - placement:
        type: tosca.policies.Placement
        metadata: {zone: a}
    - scaling:
        targets: web
"#,
        )
        .unwrap();

        let policies = read_policies(&registry, "app.yaml", &document, &problems).unwrap();
        let names: Vec<_> = policies.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["placement", "scaling"]);
        assert_eq!(policies[1].targets, vec!["web"]);

        let problems = problems.take();
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0].path, "app.yaml.topology_template.policies.placement");
        assert_eq!(problems[0].code(), D_FIELD_UNSUPPORTED);
        assert_eq!(problems[1].code(), D_FIELD_MISSING);
    }

    #[test]
    fn test_read_policies_version_handling() {
        let registry = builtin_registry().unwrap();
        let problems = Problems::new();

        let unversioned: ProfileValue = serde_yaml::from_str("topology_template: {}").unwrap();
        assert!(read_policies(&registry, "a.yaml", &unversioned, &problems)
            .unwrap()
            .is_empty());
        assert_eq!(problems.take()[0].code(), D_FIELD_MISSING);

        let future: ProfileValue =
            serde_yaml::from_str("tosca_definitions_version: tosca_3_0").unwrap();
        let err = read_policies(&registry, "b.yaml", &future, &problems).unwrap_err();
        assert_eq!(err.code(), C_GRAMMAR_UNKNOWN_VERSION);
    }
}
