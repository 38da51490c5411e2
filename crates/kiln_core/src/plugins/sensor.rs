//! Sensors and the nodes they own: samplers, films and reconstruction
//! filters.
//!
//! Counts and sizes are kept as raw integers in the drafts. The scene
//! builder checks them together with the one-sampler/one-film rule so all
//! of a sensor's problems are reported in a single pass.

use kiln_math::{Mat4, Mat4Ext, Vec2};

use super::{Children, Instantiated, Props};
use crate::document::NodeKind;
use crate::error::NodeContext;
use crate::scene::{FovAxis, RFilter, SamplerKind, SensorKind};

const PIXEL_FORMATS: &[&str] = &["rgb", "rgba", "luminance", "luminance_alpha", "xyz", "xyza"];
const COMPONENT_FORMATS: &[&str] = &["float16", "float32", "uint32"];

/// A sensor whose sampler and film have not been counted yet.
#[derive(Clone, Debug)]
pub struct SensorDraft {
    pub context: NodeContext,
    pub id: Option<String>,
    pub kind: SensorKind,
    pub near_clip: f32,
    pub far_clip: f32,
    pub to_world: Mat4,
    pub samplers: Vec<SamplerDraft>,
    pub films: Vec<FilmDraft>,
}

#[derive(Clone, Debug)]
pub struct SamplerDraft {
    pub context: NodeContext,
    pub kind: SamplerKind,
    pub sample_count: i64,
    pub seed: i64,
}

#[derive(Clone, Debug)]
pub struct FilmDraft {
    pub context: NodeContext,
    pub width: i64,
    pub height: i64,
    pub pixel_format: String,
    pub component_format: String,
    pub rfilter: RFilter,
}

pub(super) fn build_sensor(props: &mut Props<'_, '_>, mut children: Children) -> Option<Instantiated> {
    let kind = match props.plugin_type() {
        "perspective" => {
            let fov = props.float("fov", 39.3077);
            if !(fov > 0.0 && fov < 180.0) {
                props.invalid(format!("fov must be in (0, 180) degrees, found {}", fov));
            }
            let axis = props.string("fov_axis", "x");
            let fov_axis = FovAxis::parse(&axis).unwrap_or_else(|| {
                props.invalid(format!(
                    "fov_axis must be one of x, y, diagonal, smaller, larger; found \"{}\"",
                    axis
                ));
                FovAxis::X
            });
            SensorKind::Perspective {
                fov,
                fov_axis,
                principal_point_offset: Vec2::new(
                    props.float("principal_point_offset_x", 0.0),
                    props.float("principal_point_offset_y", 0.0),
                ),
            }
        }
        "orthographic" => SensorKind::Orthographic,
        _ => return props.unknown_type(),
    };

    let near_clip = props.float("near_clip", 0.01);
    let far_clip = props.float("far_clip", 10000.0);
    if near_clip <= 0.0 {
        props.invalid(format!("near_clip must be positive, found {}", near_clip));
    }
    if far_clip <= near_clip {
        props.invalid(format!(
            "far_clip ({}) must be greater than near_clip ({})",
            far_clip, near_clip
        ));
    }
    let to_world = props.transform("to_world");
    if !to_world.is_affine() {
        props.invalid("to_world must be an affine transform");
    }

    let samplers = children
        .take_kind(NodeKind::Sampler)
        .into_iter()
        .filter_map(|c| match c.object {
            Instantiated::Sampler(s) => Some(s),
            _ => None,
        })
        .collect();
    let films = children
        .take_kind(NodeKind::Film)
        .into_iter()
        .filter_map(|c| match c.object {
            Instantiated::Film(f) => Some(f),
            _ => None,
        })
        .collect();
    children.reject_rest(props, "sampler or film");

    Some(Instantiated::Sensor(SensorDraft {
        context: props.context(),
        id: props.id(),
        kind,
        near_clip,
        far_clip,
        to_world,
        samplers,
        films,
    }))
}

pub(super) fn build_sampler(props: &mut Props<'_, '_>, children: Children) -> Option<Instantiated> {
    let kind = match props.plugin_type() {
        "independent" => SamplerKind::Independent,
        "stratified" => SamplerKind::Stratified,
        "multijitter" => SamplerKind::Multijitter,
        "ldsampler" => SamplerKind::LdSampler,
        _ => return props.unknown_type(),
    };
    let sample_count = props.int("sample_count", 4);
    let seed = props.int("seed", 0);
    children.reject_rest(props, "no nested nodes");

    Some(Instantiated::Sampler(SamplerDraft {
        context: props.context(),
        kind,
        sample_count,
        seed,
    }))
}

pub(super) fn build_film(props: &mut Props<'_, '_>, mut children: Children) -> Option<Instantiated> {
    if props.plugin_type() != "hdrfilm" {
        return props.unknown_type();
    }
    let width = props.int("width", 768);
    let height = props.int("height", 576);

    let pixel_format = props.string("pixel_format", "rgb");
    if !PIXEL_FORMATS.contains(&pixel_format.as_str()) {
        props.invalid(format!("unsupported pixel_format \"{}\"", pixel_format));
    }
    let component_format = props.string("component_format", "float16");
    if !COMPONENT_FORMATS.contains(&component_format.as_str()) {
        props.invalid(format!(
            "unsupported component_format \"{}\"",
            component_format
        ));
    }

    let mut filters = children.take_kind(NodeKind::RFilter).into_iter();
    let rfilter = match filters.next().map(|c| c.object) {
        Some(Instantiated::RFilter(f)) => f,
        _ => RFilter::default(),
    };
    let extra = filters.count();
    if extra > 0 {
        props.invalid(format!(
            "a film takes at most one rfilter, found {}",
            extra + 1
        ));
    }
    children.reject_rest(props, "rfilter");

    Some(Instantiated::Film(FilmDraft {
        context: props.context(),
        width,
        height,
        pixel_format,
        component_format,
        rfilter,
    }))
}

pub(super) fn build_rfilter(props: &mut Props<'_, '_>, children: Children) -> Option<Instantiated> {
    let filter = match props.plugin_type() {
        "box" => RFilter::Box,
        "tent" => RFilter::Tent,
        "gaussian" => {
            let stddev = props.float("stddev", 0.5);
            if stddev <= 0.0 {
                props.invalid(format!("stddev must be positive, found {}", stddev));
            }
            RFilter::Gaussian { stddev }
        }
        _ => return props.unknown_type(),
    };
    children.reject_rest(props, "no nested nodes");
    Some(Instantiated::RFilter(filter))
}
