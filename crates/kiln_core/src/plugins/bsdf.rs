use kiln_math::Vec3;

use super::{Arena, Children, Instantiated, Props};
use crate::document::NodeKind;
use crate::scene::{Bsdf, BsdfEntry, Principled};

/// Named indices of refraction accepted in place of a number.
const IOR_TABLE: &[(&str, f32)] = &[
    ("vacuum", 1.0),
    ("helium", 1.000036),
    ("hydrogen", 1.000132),
    ("air", 1.000277),
    ("carbon dioxide", 1.00045),
    ("water", 1.3330),
    ("acetone", 1.36),
    ("ethanol", 1.361),
    ("carbon tetrachloride", 1.461),
    ("glycerol", 1.4729),
    ("benzene", 1.501),
    ("silicone oil", 1.52045),
    ("bromine", 1.661),
    ("water ice", 1.31),
    ("fused quartz", 1.458),
    ("pyrex", 1.470),
    ("acrylic glass", 1.49),
    ("polypropylene", 1.49),
    ("bk7", 1.5046),
    ("sodium chloride", 1.544),
    ("amber", 1.55),
    ("pet", 1.5750),
    ("diamond", 2.419),
];

fn lookup_ior(name: &str) -> Option<f32> {
    let name = name.to_ascii_lowercase();
    IOR_TABLE
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, ior)| *ior)
}

/// Index of refraction given as a float or a material name.
fn ior(props: &mut Props<'_, '_>, name: &str, default: f32) -> f32 {
    match props.float_or_name(name) {
        None => default,
        Some(Err(material)) => lookup_ior(&material).unwrap_or_else(|| {
            props.invalid(format!("unknown index of refraction \"{}\"", material));
            default
        }),
        Some(Ok(value)) => {
            if value <= 0.0 {
                props.invalid(format!("{} must be positive, found {}", name, value));
            }
            value
        }
    }
}

pub(super) fn build(
    props: &mut Props<'_, '_>,
    mut children: Children,
    arena: &mut Arena,
) -> Option<Instantiated> {
    let bsdf = match props.plugin_type() {
        "diffuse" => {
            // Keep building so sibling errors still surface
            let reflectance = props.required_rgb("reflectance").unwrap_or(Vec3::splat(0.5));
            Bsdf::Diffuse { reflectance }
        }
        "twosided" => {
            let nested: Vec<_> = children
                .take_kind(NodeKind::Bsdf)
                .into_iter()
                .filter_map(|c| match c.object {
                    Instantiated::Bsdf(handle) => Some(handle),
                    _ => None,
                })
                .collect();
            let failed = children.failed(NodeKind::Bsdf);
            let (front, back) = match (nested.as_slice(), failed) {
                ([front], 0) => (*front, None),
                ([front, back], 0) => (*front, Some(*back)),
                _ => {
                    let declared = nested.len() + failed;
                    if !(1..=2).contains(&declared) {
                        props.invalid(format!(
                            "twosided takes one or two nested bsdfs, found {}",
                            declared
                        ));
                    }
                    children.reject_rest(props, "bsdf");
                    return None;
                }
            };
            Bsdf::TwoSided { front, back }
        }
        "principled" => {
            let d = Principled::default();
            let p = Principled {
                base_color: props.rgb("base_color", d.base_color),
                metallic: props.float("metallic", d.metallic),
                specular: props.float("specular", d.specular),
                spec_tint: props.float("spec_tint", d.spec_tint),
                roughness: props.float("roughness", d.roughness),
                anisotropic: props.float("anisotropic", d.anisotropic),
                sheen: props.float("sheen", d.sheen),
                sheen_tint: props.float("sheen_tint", d.sheen_tint),
                clearcoat: props.float("clearcoat", d.clearcoat),
                clearcoat_gloss: props.float("clearcoat_gloss", d.clearcoat_gloss),
                spec_trans: props.float("spec_trans", d.spec_trans),
                eta: props.float("eta", d.eta),
            };
            for (name, value) in [
                ("metallic", p.metallic),
                ("roughness", p.roughness),
                ("spec_trans", p.spec_trans),
            ] {
                if !(0.0..=1.0).contains(&value) {
                    props.invalid(format!("{} must be in [0, 1], found {}", name, value));
                }
            }
            Bsdf::Principled(p)
        }
        "dielectric" => Bsdf::Dielectric {
            int_ior: ior(props, "int_ior", 1.5046),
            ext_ior: ior(props, "ext_ior", 1.000277),
        },
        "conductor" => Bsdf::Conductor {
            material: props.string("material", "none"),
            eta: props.opt_rgb("eta"),
            k: props.opt_rgb("k"),
        },
        "plastic" => Bsdf::Plastic {
            diffuse_reflectance: props.rgb("diffuse_reflectance", Vec3::splat(0.5)),
            int_ior: ior(props, "int_ior", 1.49),
            ext_ior: ior(props, "ext_ior", 1.000277),
        },
        _ => return props.unknown_type(),
    };
    let accepted = if matches!(bsdf, Bsdf::TwoSided { .. }) {
        "bsdf"
    } else {
        "no nested nodes"
    };
    children.reject_rest(props, accepted);

    let handle = arena.push_bsdf(BsdfEntry {
        id: props.id(),
        bsdf,
    });
    Some(Instantiated::Bsdf(handle))
}
