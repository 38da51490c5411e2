//! Plugin instantiation.
//!
//! Dispatch is two-level: the node kind picks a module below, and the
//! `type` attribute picks the concrete plugin inside it. Children are built
//! first (bottom-up), references are resolved against the registry at the
//! point they are reached, and the finished node is then published under
//! its id.

mod bsdf;
mod emitter;
mod integrator;
mod sensor;
mod shape;
mod volume;

pub use sensor::{FilmDraft, SamplerDraft, SensorDraft};
pub use shape::ShapeDraft;

use kiln_math::{Mat4, Vec3};

use crate::document::{Child, NodeDecl, NodeKind, Property};
use crate::error::{LoadError, Location, NodeContext};
use crate::registry::NodeRegistry;
use crate::scene::{
    BsdfEntry, BsdfHandle, Emitter, Integrator, RFilter, VolumeEntry, VolumeHandle,
};
use crate::value::Value;

/// Arena storage for kinds that are shared by handle.
#[derive(Clone, Debug, Default)]
pub struct Arena {
    pub bsdfs: Vec<BsdfEntry>,
    pub volumes: Vec<VolumeEntry>,
}

impl Arena {
    fn push_bsdf(&mut self, entry: BsdfEntry) -> BsdfHandle {
        self.bsdfs.push(entry);
        BsdfHandle(self.bsdfs.len() - 1)
    }

    fn push_volume(&mut self, entry: VolumeEntry) -> VolumeHandle {
        self.volumes.push(entry);
        VolumeHandle(self.volumes.len() - 1)
    }
}

/// The typed object built for one node.
#[derive(Clone, Debug)]
pub enum Instantiated {
    Integrator(Integrator),
    Sensor(SensorDraft),
    Sampler(SamplerDraft),
    Film(FilmDraft),
    RFilter(RFilter),
    Bsdf(BsdfHandle),
    Emitter(Emitter),
    Shape(ShapeDraft),
    Volume(VolumeHandle),
}

impl Instantiated {
    pub fn kind(&self) -> NodeKind {
        match self {
            Instantiated::Integrator(_) => NodeKind::Integrator,
            Instantiated::Sensor(_) => NodeKind::Sensor,
            Instantiated::Sampler(_) => NodeKind::Sampler,
            Instantiated::Film(_) => NodeKind::Film,
            Instantiated::RFilter(_) => NodeKind::RFilter,
            Instantiated::Bsdf(_) => NodeKind::Bsdf,
            Instantiated::Emitter(_) => NodeKind::Emitter,
            Instantiated::Shape(_) => NodeKind::Shape,
            Instantiated::Volume(_) => NodeKind::Volume,
        }
    }
}

/// Output of the instantiation pass, ready for the scene builder.
#[derive(Clone, Debug, Default)]
pub struct Instantiation {
    pub roots: Vec<(NodeContext, Instantiated)>,
    pub arena: Arena,
}

/// Build a diagnostic context for a node.
pub fn node_context(node: &NodeDecl) -> NodeContext {
    NodeContext {
        kind: node.kind.name().to_string(),
        plugin_type: node.plugin_type.clone(),
        id: node.id.clone(),
        location: node.location,
    }
}

/// Walks the parse tree and builds typed objects.
pub struct Instantiator<'e> {
    registry: NodeRegistry<Instantiated>,
    arena: Arena,
    errors: &'e mut Vec<LoadError>,
    strict: bool,
}

impl<'e> Instantiator<'e> {
    pub fn new(errors: &'e mut Vec<LoadError>, strict: bool) -> Self {
        Self {
            registry: NodeRegistry::new(),
            arena: Arena::default(),
            errors,
            strict,
        }
    }

    /// Declare every id, then instantiate the top-level nodes in order.
    pub fn run(mut self, nodes: &[NodeDecl]) -> Instantiation {
        self.registry.declare_all(nodes, self.errors);
        log::debug!("Registered {} node ids", self.registry.len());

        let mut roots = Vec::with_capacity(nodes.len());
        for node in nodes {
            if let Some(object) = self.instantiate(node) {
                roots.push((node_context(node), object));
            }
        }
        Instantiation {
            roots,
            arena: self.arena,
        }
    }

    /// Build one node and its subtree. `None` means the node could not be
    /// built; the reason has already been recorded.
    pub fn instantiate(&mut self, node: &NodeDecl) -> Option<Instantiated> {
        match self.build(node) {
            Outcome::Built(object) => Some(object),
            Outcome::Failed | Outcome::Aborted => None,
        }
    }

    fn build(&mut self, node: &NodeDecl) -> Outcome {
        if self.registry.is_duplicate(node.index) {
            return Outcome::Aborted;
        }
        log::debug!(
            "Instantiating {} \"{}\"{}",
            node.kind,
            node.plugin_type,
            node.id
                .as_deref()
                .map(|id| format!(" '{}'", id))
                .unwrap_or_default()
        );

        let mut children = Vec::with_capacity(node.children.len());
        let mut failed = Vec::new();
        let mut aborted = false;
        for child in &node.children {
            match child {
                Child::Node(decl) => match self.build(decl) {
                    Outcome::Built(object) => children.push(ChildObject {
                        name: decl.name.clone(),
                        object,
                        location: decl.location,
                        by_ref: false,
                    }),
                    Outcome::Failed => failed.push(decl.kind),
                    Outcome::Aborted => aborted = true,
                },
                Child::Ref(r) => match self.registry.resolve_ref(&r.id, r.location) {
                    Ok(Some(object)) => children.push(ChildObject {
                        name: r.name.clone(),
                        object: object.clone(),
                        location: r.location,
                        by_ref: true,
                    }),
                    // The target already reported its own errors
                    Ok(None) => aborted = true,
                    Err(e) => {
                        self.errors.push(e);
                        aborted = true;
                    }
                },
            }
        }

        // A missing or duplicate dependency leaves nothing meaningful to
        // check. A child that merely failed still lets this node report
        // its own problems.
        let outcome = if aborted {
            Outcome::Aborted
        } else {
            let mut props = Props::new(node, self.errors, self.strict);
            let complete = failed.is_empty();
            let children = Children::new(children, failed);
            let result = match node.kind {
                NodeKind::Integrator => integrator::build(&mut props, children),
                NodeKind::Sensor => sensor::build_sensor(&mut props, children),
                NodeKind::Sampler => sensor::build_sampler(&mut props, children),
                NodeKind::Film => sensor::build_film(&mut props, children),
                NodeKind::RFilter => sensor::build_rfilter(&mut props, children),
                NodeKind::Bsdf => bsdf::build(&mut props, children, &mut self.arena),
                NodeKind::Emitter => emitter::build(&mut props, children),
                NodeKind::Shape => shape::build(&mut props, children),
                NodeKind::Volume => volume::build(&mut props, children, &mut self.arena),
            };
            props.finish();
            match result {
                Some(object) if complete => Outcome::Built(object),
                _ => Outcome::Failed,
            }
        };

        if let Some(id) = &node.id {
            match &outcome {
                Outcome::Built(object) => self.registry.complete(id, node.index, object.clone()),
                Outcome::Failed | Outcome::Aborted => self.registry.fail(id, node.index),
            }
        }
        outcome
    }
}

/// Result of building one node.
enum Outcome {
    Built(Instantiated),
    /// The node or one of its children reported errors.
    Failed,
    /// A duplicate id or an unresolved reference cut the subtree short.
    Aborted,
}

/// A built child together with how it was attached.
#[derive(Clone, Debug)]
pub struct ChildObject {
    /// The `name` attribute on the nested node or `<ref>`
    pub name: Option<String>,
    pub object: Instantiated,
    pub location: Location,
    pub by_ref: bool,
}

/// The node-valued children of a node, consumed by the plugin builder.
pub struct Children {
    items: Vec<ChildObject>,
    failed: Vec<NodeKind>,
}

impl Children {
    fn new(items: Vec<ChildObject>, failed: Vec<NodeKind>) -> Self {
        Self { items, failed }
    }

    /// Number of nested children of `kind` that failed to build.
    pub fn failed(&self, kind: NodeKind) -> usize {
        self.failed.iter().filter(|k| **k == kind).count()
    }

    /// Remove and return every child of the given kind, in order.
    pub fn take_kind(&mut self, kind: NodeKind) -> Vec<ChildObject> {
        let (taken, rest) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|c| c.object.kind() == kind);
        self.items = rest;
        taken
    }

    /// Report every child that the plugin did not take.
    pub fn reject_rest(self, props: &mut Props<'_, '_>, accepted: &str) {
        for child in self.items {
            props.error(LoadError::TypeMismatch {
                location: child.location,
                property: child
                    .name
                    .unwrap_or_else(|| child.object.kind().name().to_string()),
                expected: format!("{} inside {}", accepted, props.node.kind),
                found: if child.by_ref {
                    format!("reference to a {}", child.object.kind())
                } else {
                    format!("nested {}", child.object.kind())
                },
            });
        }
    }
}

/// Typed access to a node's literal properties.
///
/// Every lookup marks the property as consumed; `finish` reports the ones
/// the plugin never asked for.
pub struct Props<'n, 'e> {
    node: &'n NodeDecl,
    errors: &'e mut Vec<LoadError>,
    consumed: Vec<bool>,
    strict: bool,
    unknown_type: bool,
}

impl<'n, 'e> Props<'n, 'e> {
    pub fn new(node: &'n NodeDecl, errors: &'e mut Vec<LoadError>, strict: bool) -> Self {
        Self {
            node,
            errors,
            consumed: vec![false; node.properties.len()],
            strict,
            unknown_type: false,
        }
    }

    pub fn plugin_type(&self) -> &'n str {
        &self.node.plugin_type
    }

    pub fn id(&self) -> Option<String> {
        self.node.id.clone()
    }

    pub fn context(&self) -> NodeContext {
        node_context(self.node)
    }

    pub fn error(&mut self, error: LoadError) {
        self.errors.push(error);
    }

    /// Report a constraint violation on this node.
    pub fn invalid(&mut self, message: impl Into<String>) {
        let node = self.context();
        self.errors.push(LoadError::Validation {
            node,
            message: message.into(),
        });
    }

    /// Report an unrecognised `type` attribute.
    pub fn unknown_type<T>(&mut self) -> Option<T> {
        self.unknown_type = true;
        self.errors.push(LoadError::UnknownPluginType {
            kind: self.node.kind.name().to_string(),
            plugin_type: self.node.plugin_type.clone(),
            location: self.node.location,
        });
        None
    }

    fn lookup(&mut self, name: &str) -> Option<&'n Property> {
        let i = self.node.properties.iter().position(|p| p.name == name)?;
        self.consumed[i] = true;
        Some(&self.node.properties[i])
    }

    fn mismatch(&mut self, prop: &Property, expected: &str) {
        self.errors.push(LoadError::TypeMismatch {
            location: prop.location,
            property: prop.name.clone(),
            expected: expected.to_string(),
            found: prop.value.kind_name().to_string(),
        });
    }

    /// Report a required property that is absent. Properties that were
    /// present but malformed have already been reported.
    fn missing(&mut self, name: &str) {
        if self.node.invalid.iter().any(|n| n == name) {
            return;
        }
        let node = self.context();
        self.errors.push(LoadError::MissingProperty {
            node,
            property: name.to_string(),
        });
    }

    pub fn has(&self, name: &str) -> bool {
        self.node.property(name).is_some()
    }

    pub fn opt_float(&mut self, name: &str) -> Option<f32> {
        let prop = self.lookup(name)?;
        match prop.value {
            Value::Float(v) => Some(v),
            Value::Integer(v) => Some(v as f32),
            _ => {
                self.mismatch(prop, "float");
                None
            }
        }
    }

    pub fn float(&mut self, name: &str, default: f32) -> f32 {
        self.opt_float(name).unwrap_or(default)
    }

    pub fn opt_int(&mut self, name: &str) -> Option<i64> {
        let prop = self.lookup(name)?;
        match prop.value {
            Value::Integer(v) => Some(v),
            _ => {
                self.mismatch(prop, "integer");
                None
            }
        }
    }

    pub fn int(&mut self, name: &str, default: i64) -> i64 {
        self.opt_int(name).unwrap_or(default)
    }

    /// Non-negative integer that fits a `u32`.
    pub fn count(&mut self, name: &str, default: u32) -> u32 {
        match self.opt_int(name) {
            None => default,
            Some(v) => match u32::try_from(v) {
                Ok(v) => v,
                Err(_) => {
                    self.invalid(format!("'{}' must be a non-negative integer, found {}", name, v));
                    default
                }
            },
        }
    }

    pub fn bool(&mut self, name: &str, default: bool) -> bool {
        let Some(prop) = self.lookup(name) else {
            return default;
        };
        match prop.value {
            Value::Boolean(v) => v,
            _ => {
                self.mismatch(prop, "boolean");
                default
            }
        }
    }

    pub fn opt_string(&mut self, name: &str) -> Option<String> {
        let prop = self.lookup(name)?;
        match &prop.value {
            Value::String(v) => Some(v.clone()),
            _ => {
                self.mismatch(prop, "string");
                None
            }
        }
    }

    pub fn string(&mut self, name: &str, default: &str) -> String {
        self.opt_string(name).unwrap_or_else(|| default.to_string())
    }

    pub fn required_string(&mut self, name: &str) -> Option<String> {
        if !self.has(name) {
            self.missing(name);
            return None;
        }
        self.opt_string(name)
    }

    /// Float property that may instead be written as a string name.
    pub fn float_or_name(&mut self, name: &str) -> Option<Result<f32, String>> {
        let prop = self.lookup(name)?;
        match &prop.value {
            Value::Float(v) => Some(Ok(*v)),
            Value::Integer(v) => Some(Ok(*v as f32)),
            Value::String(s) => Some(Err(s.clone())),
            _ => {
                self.mismatch(prop, "float or string");
                None
            }
        }
    }

    pub fn opt_rgb(&mut self, name: &str) -> Option<Vec3> {
        let prop = self.lookup(name)?;
        match prop.value {
            Value::Rgb(v) => Some(v),
            _ => {
                self.mismatch(prop, "rgb");
                None
            }
        }
    }

    pub fn rgb(&mut self, name: &str, default: Vec3) -> Vec3 {
        self.opt_rgb(name).unwrap_or(default)
    }

    pub fn required_rgb(&mut self, name: &str) -> Option<Vec3> {
        if !self.has(name) {
            self.missing(name);
            return None;
        }
        self.opt_rgb(name)
    }

    /// Rgb value, or a float broadcast to all three channels.
    pub fn spectrum(&mut self, name: &str, default: Vec3) -> Vec3 {
        let Some(prop) = self.lookup(name) else {
            return default;
        };
        match prop.value {
            Value::Rgb(v) => v,
            Value::Float(v) => Vec3::splat(v),
            Value::Integer(v) => Vec3::splat(v as f32),
            _ => {
                self.mismatch(prop, "rgb or float");
                default
            }
        }
    }

    pub fn point(&mut self, name: &str, default: Vec3) -> Vec3 {
        let Some(prop) = self.lookup(name) else {
            return default;
        };
        match prop.value {
            Value::Point(v) => v,
            _ => {
                self.mismatch(prop, "point");
                default
            }
        }
    }

    pub fn required_vector(&mut self, name: &str) -> Option<Vec3> {
        let Some(prop) = self.lookup(name) else {
            self.missing(name);
            return None;
        };
        match prop.value {
            Value::Vector(v) => Some(v),
            _ => {
                self.mismatch(prop, "vector");
                None
            }
        }
    }

    pub fn transform(&mut self, name: &str) -> Mat4 {
        let Some(prop) = self.lookup(name) else {
            return Mat4::IDENTITY;
        };
        match prop.value {
            Value::Transform(m) => m,
            _ => {
                self.mismatch(prop, "transform");
                Mat4::IDENTITY
            }
        }
    }

    /// Report properties the plugin did not read.
    pub fn finish(self) {
        // Nothing was looked up for an unrecognised type
        if self.unknown_type {
            return;
        }
        for (prop, _) in self
            .node
            .properties
            .iter()
            .zip(&self.consumed)
            .filter(|(_, used)| !**used)
        {
            if self.strict {
                self.errors.push(LoadError::Validation {
                    node: node_context(self.node),
                    message: format!("property '{}' is not used by this plugin", prop.name),
                });
            } else {
                log::warn!(
                    "Unused property '{}' on {} \"{}\" at {}",
                    prop.name,
                    self.node.kind,
                    self.node.plugin_type,
                    prop.location
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{parse_defaults, parse_nodes};
    use crate::scene::Bsdf;
    use crate::xml::parse_document;

    fn run(xml: &str) -> (Instantiation, Vec<LoadError>) {
        run_with(xml, false)
    }

    fn run_with(xml: &str, strict: bool) -> (Instantiation, Vec<LoadError>) {
        let root = parse_document(xml).unwrap();
        let mut errors = Vec::new();
        let params = parse_defaults(&root, &mut errors);
        let nodes = parse_nodes(&root, &params, &mut errors);
        assert!(errors.is_empty(), "{:?}", errors);
        let inst = Instantiator::new(&mut errors, strict).run(&nodes);
        (inst, errors)
    }

    #[test]
    fn test_ref_after_declaration_resolves() {
        let (inst, errors) = run(
            r#"<scene version="2.1.0">
                <bsdf type="diffuse" id="mat-itu_glass">
                    <rgb name="reflectance" value="0.1 0.1 0.1"/>
                </bsdf>
                <shape type="sphere">
                    <ref id="mat-itu_glass" name="bsdf"/>
                </shape>
            </scene>"#,
        );
        assert!(errors.is_empty(), "{:?}", errors);
        let Instantiated::Shape(shape) = &inst.roots[1].1 else {
            panic!("expected a shape");
        };
        assert_eq!(shape.bsdfs, vec![BsdfHandle(0)]);
        assert_eq!(inst.arena.bsdfs.len(), 1);
    }

    #[test]
    fn test_forward_ref_is_unresolved() {
        let (inst, errors) = run(
            r#"<scene version="2.1.0">
                <shape type="sphere">
                    <ref id="mat-itu_glass"/>
                </shape>
                <bsdf type="diffuse" id="mat-itu_glass">
                    <rgb name="reflectance" value="0.1 0.1 0.1"/>
                </bsdf>
            </scene>"#,
        );
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            LoadError::UnresolvedReference { id, .. } if id == "mat-itu_glass"
        ));
        // The shape's subtree is aborted, the bsdf still builds
        assert_eq!(inst.roots.len(), 1);
        assert_eq!(inst.roots[0].1.kind(), NodeKind::Bsdf);
    }

    #[test]
    fn test_ref_to_ancestor_is_unresolved() {
        let (_, errors) = run(
            r#"<scene version="2.1.0">
                <bsdf type="twosided" id="outer">
                    <ref id="outer"/>
                </bsdf>
            </scene>"#,
        );
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], LoadError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_inline_children_are_owned_by_parent() {
        let (inst, errors) = run(
            r#"<scene version="2.1.0">
                <bsdf type="twosided" id="mat-itu_metal">
                    <bsdf type="principled">
                        <rgb name="base_color" value="0.2 0.2 0.25"/>
                        <float name="metallic" value="1"/>
                    </bsdf>
                </bsdf>
            </scene>"#,
        );
        assert!(errors.is_empty(), "{:?}", errors);
        let bsdfs = &inst.arena.bsdfs;
        assert_eq!(bsdfs.len(), 2);
        assert_eq!(bsdfs[0].id, None);
        assert_eq!(bsdfs[1].id.as_deref(), Some("mat-itu_metal"));
        assert_eq!(
            bsdfs[1].bsdf,
            Bsdf::TwoSided {
                front: BsdfHandle(0),
                back: None
            }
        );
    }

    #[test]
    fn test_unknown_plugin_type() {
        let (inst, errors) = run(
            r#"<scene version="2.1.0">
                <bsdf type="velvet" id="cloth"/>
                <shape type="sphere"><ref id="cloth"/></shape>
            </scene>"#,
        );
        // The failing ref is not reported a second time
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            LoadError::UnknownPluginType { plugin_type, .. } if plugin_type == "velvet"
        ));
        assert!(inst.roots.is_empty());
    }

    #[test]
    fn test_failed_child_still_reports_parent_errors() {
        let (inst, errors) = run(
            r#"<scene version="2.1.0">
                <shape type="ply" id="mesh-floor">
                    <bsdf type="velvet"/>
                </shape>
            </scene>"#,
        );
        assert_eq!(errors.len(), 2, "{:?}", errors);
        assert!(matches!(
            &errors[0],
            LoadError::UnknownPluginType { plugin_type, .. } if plugin_type == "velvet"
        ));
        assert!(matches!(
            &errors[1],
            LoadError::MissingProperty { property, node } if property == "filename"
                && node.id.as_deref() == Some("mesh-floor")
        ));
        assert!(inst.roots.is_empty());
    }

    #[test]
    fn test_twosided_with_failed_child_is_not_miscounted() {
        let (inst, errors) = run(
            r#"<scene version="2.1.0">
                <bsdf type="twosided" id="mat-itu_cloth">
                    <bsdf type="velvet"/>
                </bsdf>
                <shape type="sphere"><ref id="mat-itu_cloth"/></shape>
            </scene>"#,
        );
        // No "found 0" complaint, and the ref to the failed wrapper is silent
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(matches!(errors[0], LoadError::UnknownPluginType { .. }));
        assert!(inst.roots.is_empty());
    }

    #[test]
    fn test_unknown_type_skips_unused_property_check() {
        let (_, errors) = run_with(
            r#"<scene version="2.1.0">
                <bsdf type="velvet"><float name="sheen" value="0.5"/></bsdf>
            </scene>"#,
            true,
        );
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(matches!(errors[0], LoadError::UnknownPluginType { .. }));
    }

    #[test]
    fn test_wrong_child_kind_is_type_mismatch() {
        let (_, errors) = run(
            r#"<scene version="2.1.0">
                <sampler type="independent" id="s"/>
                <shape type="sphere">
                    <bsdf type="diffuse"><rgb name="reflectance" value="1 1 1"/></bsdf>
                    <ref id="s"/>
                </shape>
            </scene>"#,
        );
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], LoadError::TypeMismatch { .. }));
    }

    #[test]
    fn test_property_type_mismatch() {
        let (_, errors) = run(
            r#"<scene version="2.1.0">
                <sensor type="perspective">
                    <string name="fov" value="45"/>
                </sensor>
            </scene>"#,
        );
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            LoadError::TypeMismatch { property, expected, .. } if property == "fov" && expected == "float"
        ));
    }

    #[test]
    fn test_strict_mode_rejects_unused_properties() {
        let (_, errors) = run_with(
            r#"<scene version="2.1.0">
                <emitter type="constant"><float name="sparkle" value="1"/></emitter>
            </scene>"#,
            true,
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("sparkle"));
    }
}
