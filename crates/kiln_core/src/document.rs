//! Typed parse tree for scene documents.
//!
//! Turns the raw XML element tree into plugin node declarations with
//! parameter substitution applied, literal properties parsed, and
//! `<transform>` blocks composed into matrices. Errors are collected per
//! element; a malformed property is dropped and remembered so that later
//! stages do not report it a second time as missing.

use std::borrow::Cow;
use std::fmt;

use kiln_math::{compose, ElementaryOp, Vec3};
use serde::Serialize;

use crate::error::{LoadError, Location};
use crate::params::ParameterTable;
use crate::value::{self, LiteralKind, Value, ValueError};
use crate::xml::Element;

/// Plugin node categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Integrator,
    Sensor,
    Sampler,
    Film,
    RFilter,
    Bsdf,
    Emitter,
    Shape,
    Volume,
}

impl NodeKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "integrator" => NodeKind::Integrator,
            "sensor" => NodeKind::Sensor,
            "sampler" => NodeKind::Sampler,
            "film" => NodeKind::Film,
            "rfilter" => NodeKind::RFilter,
            "bsdf" => NodeKind::Bsdf,
            "emitter" => NodeKind::Emitter,
            "shape" => NodeKind::Shape,
            "volume" => NodeKind::Volume,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Integrator => "integrator",
            NodeKind::Sensor => "sensor",
            NodeKind::Sampler => "sampler",
            NodeKind::Film => "film",
            NodeKind::RFilter => "rfilter",
            NodeKind::Bsdf => "bsdf",
            NodeKind::Emitter => "emitter",
            NodeKind::Shape => "shape",
            NodeKind::Volume => "volume",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scene format version from the root element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const MIN_SUPPORTED: Version = Version::new(2, 0, 0);
    pub const MAX_SUPPORTED_MAJOR: u32 = 3;

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a `major.minor.patch` string.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }

    pub fn is_supported(&self) -> bool {
        *self >= Self::MIN_SUPPORTED && self.major <= Self::MAX_SUPPORTED_MAJOR
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Document-order identity of a node (pre-order index).
pub type NodeIndex = usize;

/// A named literal property attached to a node.
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: Value,
    pub location: Location,
}

/// A `<ref>` edge to a previously declared node.
#[derive(Clone, Debug, PartialEq)]
pub struct RefDecl {
    pub id: String,
    pub name: Option<String>,
    pub location: Location,
}

/// A node-valued child: either declared inline or referenced.
#[derive(Clone, Debug, PartialEq)]
pub enum Child {
    Node(NodeDecl),
    Ref(RefDecl),
}

/// A plugin node declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeDecl {
    pub index: NodeIndex,
    pub kind: NodeKind,
    pub plugin_type: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub location: Location,
    pub properties: Vec<Property>,
    pub children: Vec<Child>,
    /// Properties that were present but failed to parse.
    pub invalid: Vec<String>,
}

impl NodeDecl {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Validate the root element and return the scene version.
pub fn parse_root(root: &Element) -> Result<Version, LoadError> {
    if root.tag != "scene" {
        return Err(LoadError::UnknownElement {
            tag: root.tag.clone(),
            location: root.location,
        });
    }
    let raw = root.attr("version").ok_or_else(|| LoadError::Parse {
        location: root.location,
        message: "<scene> is missing its version attribute".to_string(),
    })?;
    let version = Version::parse(raw).ok_or_else(|| LoadError::Parse {
        location: root.location,
        message: format!("malformed scene version \"{}\"", raw),
    })?;
    if !version.is_supported() {
        return Err(LoadError::UnsupportedVersion {
            location: root.location,
            version: raw.to_string(),
        });
    }
    Ok(version)
}

/// Collect every top-level `<default>` into a parameter table.
pub fn parse_defaults(root: &Element, errors: &mut Vec<LoadError>) -> ParameterTable {
    let mut table = ParameterTable::new();
    for el in root.children.iter().filter(|el| el.tag == "default") {
        let (name, value) = match (el.attr("name"), el.attr("value")) {
            (Some(name), Some(value)) => (name, value),
            _ => {
                errors.push(LoadError::Parse {
                    location: el.location,
                    message: "<default> needs both name and value attributes".to_string(),
                });
                continue;
            }
        };
        if let Err(e) = table.define(name, value, el.location) {
            errors.push(e);
        }
    }
    table
}

/// Parse every top-level plugin node, substituting parameters.
pub fn parse_nodes(
    root: &Element,
    params: &ParameterTable,
    errors: &mut Vec<LoadError>,
) -> Vec<NodeDecl> {
    let mut parser = NodeParser {
        params,
        errors,
        next_index: 0,
    };
    let mut nodes = Vec::new();
    for el in &root.children {
        if el.tag == "default" {
            continue;
        }
        if NodeKind::from_tag(&el.tag).is_none() {
            parser.errors.push(LoadError::UnknownElement {
                tag: el.tag.clone(),
                location: el.location,
            });
            continue;
        }
        if let Some(node) = parser.parse_node(el) {
            nodes.push(node);
        }
    }
    nodes
}

struct NodeParser<'p, 'e> {
    params: &'p ParameterTable,
    errors: &'e mut Vec<LoadError>,
    next_index: NodeIndex,
}

impl NodeParser<'_, '_> {
    /// Substituted attribute value, recording substitution failures.
    fn attr<'a>(&mut self, el: &'a Element, name: &str) -> Result<Option<Cow<'a, str>>, ()> {
        match el.attr(name) {
            None => Ok(None),
            Some(raw) => match self.params.resolve(raw, el.location) {
                Ok(v) => Ok(Some(v)),
                Err(e) => {
                    self.errors.push(e);
                    Err(())
                }
            },
        }
    }

    fn parse_node(&mut self, el: &Element) -> Option<NodeDecl> {
        let kind = NodeKind::from_tag(&el.tag)?;
        let index = self.next_index;
        self.next_index += 1;

        let plugin_type = match self.attr(el, "type") {
            Ok(Some(t)) => t.into_owned(),
            Ok(None) => {
                self.errors.push(LoadError::Parse {
                    location: el.location,
                    message: format!("<{}> is missing its type attribute", el.tag),
                });
                return None;
            }
            Err(()) => return None,
        };
        let id = self.attr(el, "id").ok()?.map(Cow::into_owned);
        let name = self.attr(el, "name").ok()?.map(Cow::into_owned);
        if let Some(id) = &id {
            if id.is_empty() {
                self.errors.push(LoadError::Parse {
                    location: el.location,
                    message: format!("<{}> has an empty id", el.tag),
                });
                return None;
            }
        }

        let mut node = NodeDecl {
            index,
            kind,
            plugin_type,
            id,
            name,
            location: el.location,
            properties: Vec::new(),
            children: Vec::new(),
            invalid: Vec::new(),
        };

        for child in &el.children {
            self.parse_child(&mut node, child);
        }
        Some(node)
    }

    fn parse_child(&mut self, node: &mut NodeDecl, el: &Element) {
        if NodeKind::from_tag(&el.tag).is_some() {
            if let Some(child) = self.parse_node(el) {
                node.children.push(Child::Node(child));
            }
            return;
        }

        match el.tag.as_str() {
            "ref" => {
                let id = match self.attr(el, "id") {
                    Ok(Some(id)) => id.into_owned(),
                    Ok(None) => {
                        self.errors.push(LoadError::Parse {
                            location: el.location,
                            message: "<ref> is missing its id attribute".to_string(),
                        });
                        return;
                    }
                    Err(()) => return,
                };
                let name = match self.attr(el, "name") {
                    Ok(name) => name.map(Cow::into_owned),
                    Err(()) => return,
                };
                node.children.push(Child::Ref(RefDecl {
                    id,
                    name,
                    location: el.location,
                }));
            }
            "transform" => {
                let Some(name) = self.property_name(node, el) else {
                    return;
                };
                match self.parse_transform(el) {
                    Some(ops) => self.push_property(
                        node,
                        name,
                        Value::Transform(compose(&ops)),
                        el.location,
                    ),
                    None => node.invalid.push(name),
                }
            }
            tag => match LiteralKind::from_tag(tag) {
                Some(kind) => {
                    let Some(name) = self.property_name(node, el) else {
                        return;
                    };
                    match self.parse_literal(kind, el, &name) {
                        Some(value) => self.push_property(node, name, value, el.location),
                        None => node.invalid.push(name),
                    }
                }
                None => self.errors.push(LoadError::UnknownElement {
                    tag: tag.to_string(),
                    location: el.location,
                }),
            },
        }
    }

    fn property_name(&mut self, node: &NodeDecl, el: &Element) -> Option<String> {
        match self.attr(el, "name") {
            Ok(Some(name)) => Some(name.into_owned()),
            Ok(None) => {
                self.errors.push(LoadError::Parse {
                    location: el.location,
                    message: format!(
                        "<{}> property of {} is missing its name attribute",
                        el.tag, node.kind
                    ),
                });
                None
            }
            Err(()) => None,
        }
    }

    fn push_property(&mut self, node: &mut NodeDecl, name: String, value: Value, location: Location) {
        if node.property(&name).is_some() || node.invalid.contains(&name) {
            self.errors.push(LoadError::Parse {
                location,
                message: format!("property '{}' is specified more than once", name),
            });
            return;
        }
        node.properties.push(Property {
            name,
            value,
            location,
        });
    }

    fn value_error(&mut self, e: ValueError, el: &Element, property: &str) {
        let err = match e {
            ValueError::TypeMismatch { expected, found } => LoadError::TypeMismatch {
                location: el.location,
                property: property.to_string(),
                expected: expected.name().to_string(),
                found,
            },
            ValueError::Malformed(message) => LoadError::Parse {
                location: el.location,
                message: format!("property '{}': {}", property, message),
            },
        };
        self.errors.push(err);
    }

    fn parse_literal(&mut self, kind: LiteralKind, el: &Element, name: &str) -> Option<Value> {
        if !el.children.is_empty() {
            self.errors.push(LoadError::Parse {
                location: el.location,
                message: format!("<{}> property '{}' cannot have children", el.tag, name),
            });
            return None;
        }

        // Points and vectors may be spelled with x/y/z attributes
        if matches!(kind, LiteralKind::Point | LiteralKind::Vector) && !el.has_attr("value") {
            let v = self.xyz(el, 0.0, kind, name)?;
            return Some(match kind {
                LiteralKind::Point => Value::Point(v),
                _ => Value::Vector(v),
            });
        }

        let raw = match self.attr(el, "value") {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.errors.push(LoadError::Parse {
                    location: el.location,
                    message: format!("<{}> property '{}' has no value", el.tag, name),
                });
                return None;
            }
            Err(()) => return None,
        };
        match value::parse(kind, &raw) {
            Ok(v) => Some(v),
            Err(e) => {
                self.value_error(e, el, name);
                None
            }
        }
    }

    /// Read `x`/`y`/`z` attributes, missing components take `fill`.
    fn xyz(&mut self, el: &Element, fill: f32, kind: LiteralKind, name: &str) -> Option<Vec3> {
        let mut v = [fill; 3];
        for (slot, axis) in v.iter_mut().zip(["x", "y", "z"]) {
            let raw = match self.attr(el, axis) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(()) => return None,
            };
            match value::parse_float(&raw) {
                Ok(f) => *slot = f,
                Err(e) => {
                    let e = match e {
                        ValueError::TypeMismatch { found, .. } => ValueError::TypeMismatch {
                            expected: kind,
                            found,
                        },
                        other => other,
                    };
                    self.value_error(e, el, name);
                    return None;
                }
            }
        }
        Some(Vec3::from_array(v))
    }

    /// Vector given as `value="x y z"` or as x/y/z attributes.
    fn vec3_attr(&mut self, el: &Element, attr: &str, fill: f32, name: &str) -> Option<Vec3> {
        match self.attr(el, attr) {
            Ok(Some(raw)) => match value::parse_vec3(&raw, LiteralKind::Vector) {
                Ok(v) => Some(v),
                Err(e) => {
                    self.value_error(e, el, name);
                    None
                }
            },
            Ok(None) => self.xyz(el, fill, LiteralKind::Vector, name),
            Err(()) => None,
        }
    }

    fn parse_transform(&mut self, el: &Element) -> Option<Vec<ElementaryOp>> {
        let mut ops = Vec::with_capacity(el.children.len());
        let mut ok = true;
        for op_el in &el.children {
            match self.parse_op(op_el) {
                Some(op) => match op.validate() {
                    Ok(()) => ops.push(op),
                    Err(message) => {
                        self.errors.push(LoadError::Parse {
                            location: op_el.location,
                            message: format!("<{}>: {}", op_el.tag, message),
                        });
                        ok = false;
                    }
                },
                None => ok = false,
            }
        }
        ok.then_some(ops)
    }

    fn parse_op(&mut self, el: &Element) -> Option<ElementaryOp> {
        let tag = el.tag.as_str();
        match tag {
            "translate" => self.vec3_attr(el, "value", 0.0, tag).map(ElementaryOp::Translate),
            "rotate" => {
                let axis = self.vec3_attr(el, "value", 0.0, tag)?;
                let angle = match self.attr(el, "angle") {
                    Ok(Some(raw)) => match value::parse_float(&raw) {
                        Ok(a) => a,
                        Err(e) => {
                            self.value_error(e, el, "angle");
                            return None;
                        }
                    },
                    Ok(None) => {
                        self.errors.push(LoadError::Parse {
                            location: el.location,
                            message: "<rotate> is missing its angle attribute".to_string(),
                        });
                        return None;
                    }
                    Err(()) => return None,
                };
                Some(ElementaryOp::Rotate { axis, angle })
            }
            "scale" => match self.attr(el, "value") {
                Ok(Some(raw)) => match value::parse_floats(&raw) {
                    Ok(v) if v.len() == 1 => Some(ElementaryOp::Scale(Vec3::splat(v[0]))),
                    Ok(v) if v.len() == 3 => Some(ElementaryOp::Scale(Vec3::new(v[0], v[1], v[2]))),
                    Ok(v) => {
                        self.value_error(
                            ValueError::Malformed(format!(
                                "scale needs 1 or 3 components, found {}",
                                v.len()
                            )),
                            el,
                            tag,
                        );
                        None
                    }
                    Err(e) => {
                        self.value_error(e, el, tag);
                        None
                    }
                },
                Ok(None) => self
                    .xyz(el, 1.0, LiteralKind::Vector, tag)
                    .map(ElementaryOp::Scale),
                Err(()) => None,
            },
            "matrix" => {
                let raw = match self.attr(el, "value") {
                    Ok(Some(raw)) => raw,
                    Ok(None) => {
                        self.errors.push(LoadError::Parse {
                            location: el.location,
                            message: "<matrix> has no value".to_string(),
                        });
                        return None;
                    }
                    Err(()) => return None,
                };
                let values = match value::parse_floats(&raw) {
                    Ok(values) => values,
                    Err(e) => {
                        self.value_error(e, el, tag);
                        return None;
                    }
                };
                let op = ElementaryOp::from_row_major(&values);
                if op.is_none() {
                    self.value_error(
                        ValueError::Malformed(format!(
                            "matrix needs 9 or 16 values, found {}",
                            values.len()
                        )),
                        el,
                        tag,
                    );
                }
                op
            }
            "lookat" => {
                if !el.has_attr("origin") || !el.has_attr("target") {
                    self.errors.push(LoadError::Parse {
                        location: el.location,
                        message: "<lookat> needs origin and target attributes".to_string(),
                    });
                    return None;
                }
                let origin = self.vec3_attr(el, "origin", 0.0, "origin");
                let target = self.vec3_attr(el, "target", 0.0, "target");
                let up = if el.has_attr("up") {
                    self.vec3_attr(el, "up", 0.0, "up")
                } else {
                    Some(Vec3::Y)
                };
                Some(ElementaryOp::LookAt {
                    origin: origin?,
                    target: target?,
                    up: up?,
                })
            }
            other => {
                self.errors.push(LoadError::UnknownElement {
                    tag: other.to_string(),
                    location: el.location,
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    fn parse(xml: &str) -> (Vec<NodeDecl>, Vec<LoadError>) {
        let root = parse_document(xml).unwrap();
        let mut errors = Vec::new();
        let params = parse_defaults(&root, &mut errors);
        let nodes = parse_nodes(&root, &params, &mut errors);
        (nodes, errors)
    }

    #[test]
    fn test_version_range() {
        assert!(Version::parse("2.1.0").unwrap().is_supported());
        assert!(Version::parse("3.5.2").unwrap().is_supported());
        assert!(!Version::parse("0.6.0").unwrap().is_supported());
        assert!(!Version::parse("4.0.0").unwrap().is_supported());
        assert!(Version::parse("2.1").is_none());
    }

    #[test]
    fn test_parse_root_rejects_old_version() {
        let root = parse_document(r#"<scene version="0.5.0"/>"#).unwrap();
        assert!(matches!(
            parse_root(&root),
            Err(LoadError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_substitution_in_properties() {
        let (nodes, errors) = parse(
            r#"<scene version="2.1.0">
                <default name="spp" value="64"/>
                <sampler type="independent">
                    <integer name="sample_count" value="$spp"/>
                </sampler>
            </scene>"#,
        );
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(
            nodes[0].property("sample_count").unwrap().value,
            Value::Integer(64)
        );
    }

    #[test]
    fn test_bad_literal_is_marked_invalid() {
        let (nodes, errors) = parse(
            r#"<scene version="2.1.0">
                <sensor type="perspective">
                    <float name="fov" value="wide"/>
                </sensor>
            </scene>"#,
        );
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], LoadError::TypeMismatch { .. }));
        assert!(nodes[0].property("fov").is_none());
        assert_eq!(nodes[0].invalid, vec!["fov".to_string()]);
    }

    #[test]
    fn test_transform_is_composed_in_order() {
        let (nodes, errors) = parse(
            r#"<scene version="2.1.0">
                <shape type="sphere">
                    <transform name="to_world">
                        <rotate z="1" angle="90"/>
                        <translate x="1"/>
                    </transform>
                </shape>
            </scene>"#,
        );
        assert!(errors.is_empty(), "{:?}", errors);
        let Value::Transform(m) = nodes[0].property("to_world").unwrap().value else {
            panic!("expected a transform");
        };
        let p = m.transform_point3(Vec3::X);
        assert!((p - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_translate_value_attribute() {
        let (nodes, errors) = parse(
            r#"<scene version="2.1.0">
                <shape type="sphere">
                    <transform name="to_world">
                        <translate value="-32.738136 5.700780 40.187771"/>
                        <scale value="2"/>
                    </transform>
                </shape>
            </scene>"#,
        );
        assert!(errors.is_empty(), "{:?}", errors);
        let Value::Transform(m) = nodes[0].property("to_world").unwrap().value else {
            panic!("expected a transform");
        };
        let p = m.transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(-65.476272, 11.40156, 80.375542)).length() < 1e-3);
    }

    #[test]
    fn test_duplicate_property() {
        let (_, errors) = parse(
            r#"<scene version="2.1.0">
                <film type="hdrfilm">
                    <integer name="width" value="1"/>
                    <integer name="width" value="2"/>
                </film>
            </scene>"#,
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("more than once"));
    }

    #[test]
    fn test_unknown_elements_are_reported() {
        let (nodes, errors) = parse(
            r#"<scene version="2.1.0">
                <camera type="perspective"/>
                <bsdf type="diffuse"><colour name="c" value="1"/></bsdf>
            </scene>"#,
        );
        assert_eq!(nodes.len(), 1);
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, LoadError::UnknownElement { .. })));
    }

    #[test]
    fn test_refs_and_nested_nodes_keep_order() {
        let (nodes, errors) = parse(
            r#"<scene version="2.1.0">
                <shape type="ply" id="mesh">
                    <string name="filename" value="meshes/a.ply"/>
                    <ref id="mat" name="bsdf"/>
                    <bsdf type="diffuse"/>
                </shape>
            </scene>"#,
        );
        assert!(errors.is_empty());
        let shape = &nodes[0];
        assert_eq!(shape.index, 0);
        assert!(matches!(&shape.children[0], Child::Ref(r) if r.id == "mat"));
        assert!(matches!(&shape.children[1], Child::Node(n) if n.index == 1));
    }
}
