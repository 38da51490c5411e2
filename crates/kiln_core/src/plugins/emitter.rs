use kiln_math::Vec3;

use super::{Children, Instantiated, Props};
use crate::scene::{Emitter, EmitterKind};

pub(super) fn build(props: &mut Props<'_, '_>, children: Children) -> Option<Instantiated> {
    let kind = match props.plugin_type() {
        "constant" => EmitterKind::Constant {
            radiance: props.spectrum("radiance", Vec3::ONE),
        },
        "point" => EmitterKind::Point {
            position: props.point("position", Vec3::ZERO),
            intensity: props.spectrum("intensity", Vec3::ONE),
        },
        "directional" => {
            let direction = props.required_vector("direction").unwrap_or(Vec3::NEG_Z);
            if direction.length_squared() == 0.0 {
                props.invalid("direction must be a non-zero vector");
            }
            EmitterKind::Directional {
                direction: direction.normalize_or_zero(),
                irradiance: props.spectrum("irradiance", Vec3::ONE),
            }
        }
        "envmap" => {
            let filename = props.required_string("filename").unwrap_or_default();
            let scale = props.float("scale", 1.0);
            if scale < 0.0 {
                props.invalid(format!("scale must be non-negative, found {}", scale));
            }
            EmitterKind::Envmap {
                filename,
                scale,
                to_world: props.transform("to_world"),
            }
        }
        "area" => EmitterKind::Area {
            radiance: props.spectrum("radiance", Vec3::ONE),
        },
        _ => return props.unknown_type(),
    };
    children.reject_rest(props, "no nested nodes");

    Some(Instantiated::Emitter(Emitter {
        id: props.id(),
        kind,
    }))
}
