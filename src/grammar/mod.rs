//! Grammar Version Registry
//!
//! Maps `(grammar version, entity kind)` to the reader for that entity.
//! A version either owns a reader for a kind or delegates to a later
//! version's reader with some fields suppressed:
//!
//! ```text
//! tosca_simple_yaml_1_2 / Policy
//!   └─ delegate(suppress Metadata, TriggerDefinitions)
//!        └─ tosca_simple_yaml_1_3 / Policy
//!             └─ delegate()
//!                  └─ tosca_2_0 / Policy   (canonical reader)
//! ```
//!
//! The registry is assembled once with [`GrammarRegistryBuilder`] and is
//! immutable afterwards. There is no fallback between versions: a missing
//! binding is a [`GrammarError::UnknownReader`].

pub mod context;
pub mod tosca;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use profile_types::ProfileValue;
use tracing::{debug, info};

use crate::error::GrammarError;

pub use context::{DocumentFieldError, Field, FieldProblem, Problems, ReadContext};

/// Reads one entity of a fixed kind from a context.
///
/// Errors are configuration errors only; document problems go to the
/// context's [`Problems`] sink and the reader still returns a best-effort
/// entity.
pub trait EntityReader<E>: Send + Sync {
    fn read(&self, registry: &GrammarRegistry<E>, ctx: &mut ReadContext) -> Result<E, GrammarError>;
}

impl<E, F> EntityReader<E> for F
where
    F: Fn(&GrammarRegistry<E>, &mut ReadContext) -> Result<E, GrammarError> + Send + Sync,
{
    fn read(&self, registry: &GrammarRegistry<E>, ctx: &mut ReadContext) -> Result<E, GrammarError> {
        self(registry, ctx)
    }
}

type ReaderKey = (String, String);

/// Collects reader bindings before any reading starts
pub struct GrammarRegistryBuilder<E> {
    readers: HashMap<ReaderKey, Arc<dyn EntityReader<E>>>,
}

impl<E> Default for GrammarRegistryBuilder<E> {
    fn default() -> Self {
        Self {
            readers: HashMap::new(),
        }
    }
}

impl<E> GrammarRegistryBuilder<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `reader` to `(version, kind)`. Binding a pair twice is an error.
    pub fn register<R>(
        &mut self,
        version: impl Into<String>,
        kind: impl Into<String>,
        reader: R,
    ) -> Result<&mut Self, GrammarError>
    where
        R: EntityReader<E> + 'static,
    {
        let key = (version.into(), kind.into());
        if self.readers.contains_key(&key) {
            let (version, kind) = key;
            return Err(GrammarError::DuplicateReader { version, kind });
        }
        self.readers.insert(key, Arc::new(reader));
        Ok(self)
    }

    /// Bind `(version, kind)` to `target_version`'s reader for the same kind,
    /// with `suppressed` fields marked as unsupported
    pub fn register_delegate(
        &mut self,
        version: impl Into<String>,
        kind: impl Into<String>,
        suppressed: &[&'static str],
        target_version: impl Into<String>,
    ) -> Result<&mut Self, GrammarError>
    where
        E: 'static,
    {
        let kind = kind.into();
        let target_kind = kind.clone();
        let target_version = target_version.into();
        let suppressed: Vec<&'static str> = suppressed.to_vec();
        self.register(
            version,
            kind,
            move |registry: &GrammarRegistry<E>, ctx: &mut ReadContext| {
                registry.delegate(ctx, &suppressed, &target_version, &target_kind)
            },
        )
    }

    pub fn build(self) -> GrammarRegistry<E> {
        let versions: BTreeSet<String> = self.readers.keys().map(|(v, _)| v.clone()).collect();
        info!(
            versions = versions.len(),
            readers = self.readers.len(),
            "Grammar registry built"
        );
        GrammarRegistry {
            readers: self.readers,
            versions,
        }
    }
}

/// Immutable `(version, kind) -> reader` table
pub struct GrammarRegistry<E> {
    readers: HashMap<ReaderKey, Arc<dyn EntityReader<E>>>,
    versions: BTreeSet<String>,
}

impl<E> GrammarRegistry<E> {
    pub fn builder() -> GrammarRegistryBuilder<E> {
        GrammarRegistryBuilder::new()
    }

    /// Read an entity of `kind` with the reader bound for `version`
    pub fn read(&self, version: &str, kind: &str, ctx: &mut ReadContext) -> Result<E, GrammarError> {
        let reader = self
            .readers
            .get(&(version.to_string(), kind.to_string()))
            .ok_or_else(|| GrammarError::UnknownReader {
                version: version.to_string(),
                kind: kind.to_string(),
            })?;

        let previous = ctx.enter_kind(kind);
        let result = reader.read(self, ctx);
        ctx.leave_kind(previous);
        result
    }

    /// Read with `version`'s reader while `suppressed` fields of `kind` are
    /// marked unsupported. The marks are removed when the read returns,
    /// whatever its outcome.
    pub fn delegate(
        &self,
        ctx: &mut ReadContext,
        suppressed: &[&str],
        version: &str,
        kind: &str,
    ) -> Result<E, GrammarError> {
        debug!(
            path = ctx.path(),
            document_version = ctx.version(),
            delegate_to = version,
            kind,
            ?suppressed,
            "Delegating read"
        );
        let mark = ctx.suppression_mark();
        for field in suppressed {
            ctx.set_read_tag(kind, field);
        }
        let result = self.read(version, kind, ctx);
        ctx.restore_suppression(mark);
        result
    }

    /// Whether a reader is bound for the pair
    pub fn supports(&self, version: &str, kind: &str) -> bool {
        self.readers
            .contains_key(&(version.to_string(), kind.to_string()))
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions.contains(version)
    }

    /// Registered versions, sorted
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(String::as_str)
    }

    /// Entity kinds bound for a version, sorted
    pub fn kinds(&self, version: &str) -> Vec<&str> {
        let mut kinds: Vec<&str> = self
            .readers
            .keys()
            .filter(|(v, _)| v.as_str() == version)
            .map(|(_, k)| k.as_str())
            .collect();
        kinds.sort_unstable();
        kinds
    }
}

/// Read every entity of a section with the reader bound for `(version, kind)`.
///
/// The section is either a mapping of names to entity bodies or a list of
/// single-key mappings. Each entity is read in its own context, so a broken
/// entity does not stop its siblings; only configuration errors abort.
pub fn read_entities<E>(
    registry: &GrammarRegistry<E>,
    version: &str,
    kind: &str,
    path: &str,
    section: &ProfileValue,
    problems: &Problems,
) -> Result<Vec<E>, GrammarError> {
    let mut section_ctx = ReadContext::new(path, section.clone(), version, problems.clone());
    section_ctx.enter_kind(kind);

    let mut bodies: Vec<(String, ProfileValue)> = Vec::new();
    match section {
        ProfileValue::Null => {}
        ProfileValue::Mapping(mapping) => {
            for (name, body) in mapping {
                match name.as_str() {
                    Some(name) => bodies.push((name.to_string(), body.clone())),
                    None => section_ctx.report(
                        "",
                        FieldProblem::Invalid("entity names must be strings".into()),
                    ),
                }
            }
        }
        ProfileValue::Sequence(items) => {
            for item in items {
                match item.as_mapping() {
                    Some(single) if single.len() == 1 => {
                        for (name, body) in single {
                            match name.as_str() {
                                Some(name) => bodies.push((name.to_string(), body.clone())),
                                None => section_ctx.report(
                                    "",
                                    FieldProblem::Invalid("entity names must be strings".into()),
                                ),
                            }
                        }
                    }
                    _ => section_ctx.report(
                        "",
                        FieldProblem::Invalid("list entries must be single-key mappings".into()),
                    ),
                }
            }
        }
        _ => section_ctx.report(
            "",
            FieldProblem::Invalid("expected a mapping or a list of entities".into()),
        ),
    }

    let mut entities = Vec::with_capacity(bodies.len());
    for (name, body) in bodies {
        let mut ctx = section_ctx.child(name, body);
        entities.push(registry.read(version, kind, &mut ctx)?);
    }
    Ok(entities)
}

impl<E> std::fmt::Debug for GrammarRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrammarRegistry")
            .field("versions", &self.versions)
            .field("readers", &self.readers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{C_GRAMMAR_DUPLICATE_READER, C_GRAMMAR_UNKNOWN_READER};
    use pretty_assertions::assert_eq;

    const NOTE: Field = Field::new("Note", "note");
    const LABEL: Field = Field::new("Label", "label");

    type Pair = (Option<String>, Option<String>);

    /// Reads `{label, note}` into `(label, note)`
    fn read_pair(_: &GrammarRegistry<Pair>, ctx: &mut ReadContext) -> Result<Pair, GrammarError> {
        let label = ctx.take_string(&LABEL);
        let note = ctx.take_string(&NOTE);
        ctx.report_unknown_fields();
        Ok((label, note))
    }

    fn registry() -> GrammarRegistry<Pair> {
        let mut builder = GrammarRegistry::<Pair>::builder();
        builder.register("v3", "Pair", read_pair).unwrap();
        builder.register_delegate("v2", "Pair", &["Note"], "v3").unwrap();
        builder.register_delegate("v1", "Pair", &[], "v2").unwrap();
        builder.build()
    }

    fn context(version: &str) -> ReadContext {
        let node: ProfileValue = serde_yaml::from_str("{label: a, note: b}").unwrap();
        ReadContext::new("pair", node, version, Problems::new())
    }

    #[test]
    fn test_canonical_read() {
        let registry = registry();
        let mut ctx = context("v3");
        let pair = registry.read("v3", "Pair", &mut ctx).unwrap();
        assert_eq!(pair, (Some("a".into()), Some("b".into())));
        assert!(ctx.problems().is_empty());
    }

    #[test]
    fn test_delegate_suppresses_and_restores() {
        let registry = registry();
        let mut ctx = context("v2");
        let pair = registry.read("v2", "Pair", &mut ctx).unwrap();
        assert_eq!(pair, (Some("a".into()), None));
        assert_eq!(ctx.suppression_mark(), 0);
        assert_eq!(ctx.kind(), "");

        let problems = ctx.problems().snapshot();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].field, "note");
        assert_eq!(problems[0].problem, FieldProblem::Unsupported);
    }

    #[test]
    fn test_nested_delegation_keeps_inner_suppression() {
        let registry = registry();
        let mut ctx = context("v1");
        let pair = registry.read("v1", "Pair", &mut ctx).unwrap();
        assert_eq!(pair.1, None);
        assert_eq!(ctx.problems().len(), 1);
        assert_eq!(ctx.suppression_mark(), 0);
    }

    #[test]
    fn test_unknown_reader() {
        let registry = registry();
        let err = registry.read("v0", "Pair", &mut context("v0")).unwrap_err();
        assert_eq!(err.code(), C_GRAMMAR_UNKNOWN_READER);

        let err = registry.read("v3", "Triple", &mut context("v3")).unwrap_err();
        assert_eq!(
            err,
            GrammarError::UnknownReader {
                version: "v3".into(),
                kind: "Triple".into()
            }
        );
    }

    #[test]
    fn test_delegate_restores_on_error() {
        let mut builder = GrammarRegistry::<Pair>::builder();
        builder.register_delegate("v1", "Pair", &["Note"], "missing").unwrap();
        let registry = builder.build();

        let mut ctx = context("v1");
        assert!(registry.read("v1", "Pair", &mut ctx).is_err());
        assert_eq!(ctx.suppression_mark(), 0);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut builder = GrammarRegistry::<Pair>::builder();
        builder.register("v3", "Pair", read_pair).unwrap();
        let err = builder.register("v3", "Pair", read_pair).err().unwrap();
        assert_eq!(err.code(), C_GRAMMAR_DUPLICATE_READER);
    }

    #[test]
    fn test_read_entities_isolates_siblings() {
        let registry = registry();
        let problems = Problems::new();
        let section: ProfileValue =
            serde_yaml::from_str("[{first: {label: a, note: x}}, {second: {label: b, extra: 1}}, 3]")
                .unwrap();
        let pairs = read_entities(&registry, "v3", "Pair", "pairs", &section, &problems).unwrap();
        assert_eq!(
            pairs,
            vec![(Some("a".into()), Some("x".into())), (Some("b".into()), None)]
        );

        let problems = problems.take();
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0].path, "pairs");
        assert_eq!(problems[1].path, "pairs.second");
        assert_eq!(problems[1].field, "extra");
    }

    #[test]
    fn test_versions_and_kinds() {
        let registry = registry();
        assert_eq!(registry.versions().collect::<Vec<_>>(), vec!["v1", "v2", "v3"]);
        assert_eq!(registry.kinds("v2"), vec!["Pair"]);
        assert!(registry.supports("v1", "Pair"));
        assert!(!registry.supports("v1", "Triple"));
        assert!(registry.has_version("v3"));
    }
}
