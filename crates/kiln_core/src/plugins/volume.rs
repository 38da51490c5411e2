use kiln_math::Vec3;

use super::{Arena, Children, Instantiated, Props};
use crate::scene::{Volume, VolumeEntry};

pub(super) fn build(
    props: &mut Props<'_, '_>,
    children: Children,
    arena: &mut Arena,
) -> Option<Instantiated> {
    let volume = match props.plugin_type() {
        "homogeneous" => {
            let sigma_t = props.spectrum("sigma_t", Vec3::ONE);
            let albedo = props.spectrum("albedo", Vec3::splat(0.75));
            let scale = props.float("scale", 1.0);
            if sigma_t.min_element() < 0.0 {
                props.invalid("sigma_t must be non-negative");
            }
            if albedo.min_element() < 0.0 || albedo.max_element() > 1.0 {
                props.invalid("albedo must be in [0, 1]");
            }
            Volume::Homogeneous {
                sigma_t,
                albedo,
                scale,
            }
        }
        _ => return props.unknown_type(),
    };
    children.reject_rest(props, "no nested nodes");

    let handle = arena.push_volume(VolumeEntry {
        id: props.id(),
        volume,
    });
    Some(Instantiated::Volume(handle))
}
