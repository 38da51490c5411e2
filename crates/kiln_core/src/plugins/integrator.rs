use super::{Children, Instantiated, Props};
use crate::scene::{Integrator, IntegratorKind};

pub(super) fn build(props: &mut Props<'_, '_>, children: Children) -> Option<Instantiated> {
    let kind = match props.plugin_type() {
        "path" | "volpath" => {
            let max_depth = props.int("max_depth", -1);
            let rr_depth = props.int("rr_depth", 5);
            let hide_emitters = props.bool("hide_emitters", false);
            if max_depth < -1 {
                props.invalid(format!(
                    "max_depth must be -1 (unbounded) or non-negative, found {}",
                    max_depth
                ));
            }
            if rr_depth <= 0 {
                props.invalid(format!("rr_depth must be positive, found {}", rr_depth));
            }
            if props.plugin_type() == "path" {
                IntegratorKind::Path {
                    max_depth,
                    rr_depth,
                    hide_emitters,
                }
            } else {
                IntegratorKind::VolPath {
                    max_depth,
                    rr_depth,
                    hide_emitters,
                }
            }
        }
        "direct" => {
            // shading_samples sets both counts at once
            let shading = props.count("shading_samples", 1);
            IntegratorKind::Direct {
                emitter_samples: props.count("emitter_samples", shading),
                bsdf_samples: props.count("bsdf_samples", shading),
                hide_emitters: props.bool("hide_emitters", false),
            }
        }
        _ => return props.unknown_type(),
    };
    children.reject_rest(props, "no nested nodes");

    Some(Instantiated::Integrator(Integrator {
        id: props.id(),
        kind,
    }))
}
