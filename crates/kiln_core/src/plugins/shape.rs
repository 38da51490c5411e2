//! Shapes and their attachments.
//!
//! A shape collects every bsdf and emitter it is given; whether it ended
//! up with exactly one bsdf is decided by the scene builder.

use kiln_math::{Mat4, Vec3};

use super::{Children, Instantiated, Props};
use crate::document::NodeKind;
use crate::error::{LoadError, NodeContext};
use crate::scene::{BsdfHandle, Emitter, Geometry, MeshFormat, VolumeHandle};

#[derive(Clone, Debug)]
pub struct ShapeDraft {
    pub context: NodeContext,
    pub id: Option<String>,
    pub geometry: Geometry,
    pub to_world: Mat4,
    pub flip_normals: bool,
    pub bsdfs: Vec<BsdfHandle>,
    pub emitters: Vec<Emitter>,
    pub interior: Option<VolumeHandle>,
    pub exterior: Option<VolumeHandle>,
}

pub(super) fn build(props: &mut Props<'_, '_>, mut children: Children) -> Option<Instantiated> {
    let geometry = match props.plugin_type() {
        t @ ("ply" | "obj") => Geometry::Mesh {
            format: if t == "ply" {
                MeshFormat::Ply
            } else {
                MeshFormat::Obj
            },
            filename: props.required_string("filename").unwrap_or_default(),
            face_normals: props.bool("face_normals", false),
        },
        "sphere" => {
            let radius = props.float("radius", 1.0);
            if radius <= 0.0 {
                props.invalid(format!("radius must be positive, found {}", radius));
            }
            Geometry::Sphere {
                center: props.point("center", Vec3::ZERO),
                radius,
            }
        }
        "rectangle" => Geometry::Rectangle,
        "cube" => Geometry::Cube,
        "disk" => Geometry::Disk,
        _ => return props.unknown_type(),
    };
    let to_world = props.transform("to_world");
    let flip_normals = props.bool("flip_normals", false);

    let bsdfs = children
        .take_kind(NodeKind::Bsdf)
        .into_iter()
        .filter_map(|c| match c.object {
            Instantiated::Bsdf(handle) => Some(handle),
            _ => None,
        })
        .collect();
    let emitters = children
        .take_kind(NodeKind::Emitter)
        .into_iter()
        .filter_map(|c| match c.object {
            Instantiated::Emitter(e) => Some(e),
            _ => None,
        })
        .collect();

    let mut interior = None;
    let mut exterior = None;
    for child in children.take_kind(NodeKind::Volume) {
        let Instantiated::Volume(handle) = child.object else {
            continue;
        };
        let slot = match child.name.as_deref() {
            Some("interior") => &mut interior,
            Some("exterior") => &mut exterior,
            other => {
                props.error(LoadError::TypeMismatch {
                    location: child.location,
                    property: other.unwrap_or("volume").to_string(),
                    expected: "volume named \"interior\" or \"exterior\"".to_string(),
                    found: "unnamed volume".to_string(),
                });
                continue;
            }
        };
        if slot.replace(handle).is_some() {
            props.invalid(format!(
                "more than one {} volume",
                child.name.as_deref().unwrap_or_default()
            ));
        }
    }
    children.reject_rest(props, "bsdf, emitter or volume");

    Some(Instantiated::Shape(ShapeDraft {
        context: props.context(),
        id: props.id(),
        geometry,
        to_world,
        flip_normals,
        bsdfs,
        emitters,
        interior,
        exterior,
    }))
}

#[cfg(test)]
mod tests {
    use crate::document::{parse_defaults, parse_nodes};
    use crate::error::LoadError;
    use crate::plugins::{Instantiated, Instantiator, ShapeDraft};
    use crate::scene::{Geometry, MeshFormat, VolumeHandle};
    use crate::xml::parse_document;

    fn shape(xml: &str) -> (Option<ShapeDraft>, Vec<LoadError>) {
        let root = parse_document(xml).unwrap();
        let mut errors = Vec::new();
        let params = parse_defaults(&root, &mut errors);
        let nodes = parse_nodes(&root, &params, &mut errors);
        let inst = Instantiator::new(&mut errors, false).run(&nodes);
        let draft = inst.roots.into_iter().find_map(|(_, o)| match o {
            Instantiated::Shape(s) => Some(s),
            _ => None,
        });
        (draft, errors)
    }

    #[test]
    fn test_ply_shape_with_ref() {
        let (draft, errors) = shape(
            r#"<scene version="2.1.0">
                <bsdf type="diffuse" id="mat-itu_concrete">
                    <rgb name="reflectance" value="0.5 0.5 0.5"/>
                </bsdf>
                <shape type="ply" id="mesh-floor">
                    <string name="filename" value="meshes/floor.ply"/>
                    <boolean name="face_normals" value="true"/>
                    <ref id="mat-itu_concrete" name="bsdf"/>
                </shape>
            </scene>"#,
        );
        assert!(errors.is_empty(), "{:?}", errors);
        let draft = draft.unwrap();
        assert_eq!(
            draft.geometry,
            Geometry::Mesh {
                format: MeshFormat::Ply,
                filename: "meshes/floor.ply".into(),
                face_normals: true,
            }
        );
        assert_eq!(draft.bsdfs.len(), 1);
    }

    #[test]
    fn test_mesh_requires_filename() {
        let (_, errors) = shape(
            r#"<scene version="2.1.0">
                <shape type="ply"/>
            </scene>"#,
        );
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            LoadError::MissingProperty { property, .. } if property == "filename"
        ));
    }

    #[test]
    fn test_named_volumes() {
        let (draft, errors) = shape(
            r#"<scene version="2.1.0">
                <medium type="homogeneous" id="fog"/>
                <shape type="cube">
                    <ref id="fog" name="interior"/>
                </shape>
            </scene>"#,
        );
        // <medium> is not a plugin tag here
        assert!(!errors.is_empty());
        assert!(draft.is_none());

        let (draft, errors) = shape(
            r#"<scene version="2.1.0">
                <volume type="homogeneous" id="fog"/>
                <shape type="cube">
                    <ref id="fog" name="interior"/>
                </shape>
            </scene>"#,
        );
        assert!(errors.is_empty(), "{:?}", errors);
        let draft = draft.unwrap();
        assert_eq!(draft.interior, Some(VolumeHandle(0)));
        assert_eq!(draft.exterior, None);
    }
}
