//! Final assembly and whole-scene validation.
//!
//! Runs only on an error-free instantiation. Every check runs regardless of
//! earlier failures so a single load reports all validation problems.

use std::collections::BTreeMap;

use crate::document::Version;
use crate::error::{LoadError, NodeContext};
use crate::params::ParameterTable;
use crate::plugins::{FilmDraft, Instantiated, Instantiation, SamplerDraft, SensorDraft, ShapeDraft};
use crate::scene::{EmitterKind, Film, Sampler, Scene, Sensor, Shape};

/// Collects validated scene parts and the problems found along the way.
pub struct SceneBuilder {
    version: Version,
    parameters: BTreeMap<String, String>,
    errors: Vec<LoadError>,
}

impl SceneBuilder {
    pub fn new(version: Version, params: &ParameterTable) -> Self {
        Self {
            version,
            parameters: params
                .iter()
                .map(|p| (p.name.clone(), p.value.clone()))
                .collect(),
            errors: Vec::new(),
        }
    }

    /// A shared sampler or film is checked once per referencing sensor, so
    /// repeats of the same error are dropped.
    fn invalid(&mut self, node: &NodeContext, message: impl Into<String>) {
        let error = LoadError::Validation {
            node: node.clone(),
            message: message.into(),
        };
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    /// Assemble the scene, or return every validation error found.
    pub fn build(mut self, instantiation: Instantiation) -> Result<Scene, Vec<LoadError>> {
        let Instantiation { roots, arena } = instantiation;

        let mut integrator = None;
        let mut sensors = Vec::new();
        let mut emitters = Vec::new();
        let mut shapes = Vec::new();
        let (mut sensor_decls, mut shape_decls) = (0, 0);

        for (context, object) in roots {
            match object {
                Instantiated::Integrator(i) => {
                    if integrator.is_some() {
                        self.invalid(&context, "a scene takes at most one integrator");
                    } else {
                        integrator = Some(i);
                    }
                }
                Instantiated::Sensor(draft) => {
                    sensor_decls += 1;
                    if let Some(sensor) = self.sensor(draft) {
                        sensors.push(sensor);
                    }
                }
                Instantiated::Sampler(draft) if context.id.is_some() => {
                    self.sampler(draft);
                }
                Instantiated::Film(draft) if context.id.is_some() => {
                    self.film(draft);
                }
                Instantiated::Sampler(_) | Instantiated::Film(_) | Instantiated::RFilter(_) => {
                    // Named ones may be referenced; anonymous ones are lost
                    if context.id.is_none() {
                        let parent = if context.kind == "rfilter" {
                            "film"
                        } else {
                            "sensor"
                        };
                        self.invalid(
                            &context,
                            format!(
                                "an anonymous {} must be nested inside a {}",
                                context.kind, parent
                            ),
                        );
                    }
                }
                Instantiated::Emitter(emitter) => {
                    if matches!(emitter.kind, EmitterKind::Area { .. }) {
                        self.invalid(&context, "area emitters must be attached to a shape");
                    } else {
                        emitters.push(emitter);
                    }
                }
                Instantiated::Shape(draft) => {
                    shape_decls += 1;
                    if let Some(shape) = self.shape(draft) {
                        shapes.push(shape);
                    }
                }
                // Already in their arenas
                Instantiated::Bsdf(_) | Instantiated::Volume(_) => {}
            }
        }

        // Declared-but-invalid ones have been reported already
        if sensor_decls == 0 {
            self.errors.push(LoadError::SceneValidation {
                message: "scene declares no sensor".to_string(),
            });
        }
        if shape_decls == 0 {
            self.errors.push(LoadError::SceneValidation {
                message: "scene declares no shape".to_string(),
            });
        }

        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        Ok(Scene {
            version: self.version,
            parameters: self.parameters,
            integrator,
            sensors,
            bsdfs: arena.bsdfs,
            emitters,
            shapes,
            volumes: arena.volumes,
        })
    }

    fn sensor(&mut self, draft: SensorDraft) -> Option<Sensor> {
        let SensorDraft {
            context,
            id,
            kind,
            near_clip,
            far_clip,
            to_world,
            samplers,
            films,
        } = draft;

        if samplers.len() != 1 {
            self.invalid(
                &context,
                format!("a sensor needs exactly one sampler, found {}", samplers.len()),
            );
        }
        if films.len() != 1 {
            self.invalid(
                &context,
                format!("a sensor needs exactly one film, found {}", films.len()),
            );
        }
        // Every owned node is checked, even when the counts are already wrong
        let mut samplers: Vec<_> = samplers.into_iter().map(|s| self.sampler(s)).collect();
        let mut films: Vec<_> = films.into_iter().map(|f| self.film(f)).collect();
        let sampler = match samplers.len() {
            1 => samplers.pop().flatten(),
            _ => None,
        };
        let film = match films.len() {
            1 => films.pop().flatten(),
            _ => None,
        };

        Some(Sensor {
            id,
            kind,
            near_clip,
            far_clip,
            to_world,
            sampler: sampler?,
            film: film?,
        })
    }

    fn positive_u32(&mut self, context: &NodeContext, name: &str, value: i64) -> Option<u32> {
        match u32::try_from(value) {
            Ok(v) if v > 0 => Some(v),
            _ => {
                self.invalid(
                    context,
                    format!("{} must be a positive integer, found {}", name, value),
                );
                None
            }
        }
    }

    fn sampler(&mut self, draft: SamplerDraft) -> Option<Sampler> {
        let sample_count = self.positive_u32(&draft.context, "sample_count", draft.sample_count);
        let seed = match u32::try_from(draft.seed) {
            Ok(seed) => Some(seed),
            Err(_) => {
                self.invalid(
                    &draft.context,
                    format!("seed must be a non-negative integer, found {}", draft.seed),
                );
                None
            }
        };
        Some(Sampler {
            kind: draft.kind,
            sample_count: sample_count?,
            seed: seed?,
        })
    }

    fn film(&mut self, draft: FilmDraft) -> Option<Film> {
        let width = self.positive_u32(&draft.context, "width", draft.width);
        let height = self.positive_u32(&draft.context, "height", draft.height);
        Some(Film {
            width: width?,
            height: height?,
            pixel_format: draft.pixel_format,
            component_format: draft.component_format,
            rfilter: draft.rfilter,
        })
    }

    fn shape(&mut self, draft: ShapeDraft) -> Option<Shape> {
        let ShapeDraft {
            context,
            id,
            geometry,
            to_world,
            flip_normals,
            bsdfs,
            mut emitters,
            interior,
            exterior,
        } = draft;

        let bsdf = match bsdfs.as_slice() {
            [bsdf] => Some(*bsdf),
            [] => {
                self.invalid(&context, "shape has no bsdf");
                None
            }
            many => {
                self.invalid(
                    &context,
                    format!("shape has {} bsdfs, expected exactly one", many.len()),
                );
                None
            }
        };

        let emitter = match emitters.len() {
            0 => None,
            1 => {
                let emitter = emitters.pop();
                if let Some(e) = &emitter {
                    if !matches!(e.kind, EmitterKind::Area { .. }) {
                        self.invalid(&context, "only area emitters can be attached to a shape");
                    }
                }
                emitter
            }
            n => {
                self.invalid(
                    &context,
                    format!("shape has {} emitters, expected at most one", n),
                );
                None
            }
        };

        Some(Shape {
            id,
            geometry,
            to_world,
            flip_normals,
            bsdf: bsdf?,
            emitter,
            interior,
            exterior,
            location: context.location,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{parse_defaults, parse_nodes, parse_root};
    use crate::plugins::Instantiator;
    use crate::xml::parse_document;

    fn build(xml: &str) -> Result<Scene, Vec<LoadError>> {
        let root = parse_document(xml).unwrap();
        let version = parse_root(&root).unwrap();
        let mut errors = Vec::new();
        let params = parse_defaults(&root, &mut errors);
        let nodes = parse_nodes(&root, &params, &mut errors);
        let inst = Instantiator::new(&mut errors, false).run(&nodes);
        assert!(errors.is_empty(), "{:?}", errors);
        SceneBuilder::new(version, &params).build(inst)
    }

    const SENSOR: &str = r#"
        <sensor type="perspective">
            <sampler type="independent"/>
            <film type="hdrfilm"/>
        </sensor>"#;

    const DIFFUSE: &str = r#"<bsdf type="diffuse"><rgb name="reflectance" value="0.5 0.5 0.5"/></bsdf>"#;

    #[test]
    fn test_minimal_scene() {
        let xml = format!(
            r#"<scene version="2.1.0">{}<shape type="sphere">{}</shape></scene>"#,
            SENSOR, DIFFUSE
        );
        let scene = build(&xml).unwrap();
        assert_eq!(scene.sensor_count(), 1);
        assert_eq!(scene.shape_count(), 1);
        assert!(scene.integrator.is_none());
    }

    #[test]
    fn test_two_bsdfs_on_shape() {
        let xml = format!(
            r#"<scene version="2.1.0">{}<shape type="sphere">{}{}</shape></scene>"#,
            SENSOR, DIFFUSE, DIFFUSE
        );
        let errors = build(&xml).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("2 bsdfs"));
    }

    #[test]
    fn test_validation_is_exhaustive() {
        let xml = r#"<scene version="2.1.0">
            <integrator type="path"/>
            <integrator type="path"/>
            <sensor type="perspective">
                <sampler type="independent"><integer name="sample_count" value="0"/></sampler>
                <film type="hdrfilm"/>
                <film type="hdrfilm"/>
            </sensor>
            <emitter type="area"/>
            <sampler type="independent"/>
            <shape type="sphere"/>
        </scene>"#;
        let errors = build(xml).unwrap_err();
        // integrator, film count, sample_count, area emitter, anonymous sampler, missing bsdf
        assert_eq!(errors.len(), 6, "{:#?}", errors);
        assert!(errors
            .iter()
            .all(|e| matches!(e, LoadError::Validation { .. })));
    }

    #[test]
    fn test_empty_scene() {
        let errors = build(r#"<scene version="2.1.0"/>"#).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, LoadError::SceneValidation { .. })));
    }

    #[test]
    fn test_named_sampler_at_top_level_is_allowed() {
        let xml = format!(
            r#"<scene version="2.1.0">
                <sampler type="independent" id="shared"/>
                {}<shape type="sphere">{}</shape>
            </scene>"#,
            SENSOR, DIFFUSE
        );
        assert!(build(&xml).is_ok());
    }

    #[test]
    fn test_named_sampler_is_checked_once() {
        let unused = format!(
            r#"<scene version="2.1.0">
                <sampler type="independent" id="shared">
                    <integer name="sample_count" value="0"/>
                </sampler>
                <film type="hdrfilm" id="wide"><integer name="width" value="-4"/></film>
                {}<shape type="sphere">{}</shape>
            </scene>"#,
            SENSOR, DIFFUSE
        );
        let errors = build(&unused).unwrap_err();
        assert_eq!(errors.len(), 2, "{:#?}", errors);
        assert!(errors[0].to_string().contains("sample_count"));
        assert!(errors[1].to_string().contains("width"));

        let referenced = format!(
            r#"<scene version="2.1.0">
                <sampler type="independent" id="shared">
                    <integer name="sample_count" value="0"/>
                </sampler>
                <sensor type="perspective"><ref id="shared"/><film type="hdrfilm"/></sensor>
                <sensor type="perspective"><ref id="shared"/><film type="hdrfilm"/></sensor>
                <shape type="sphere">{}</shape>
            </scene>"#,
            DIFFUSE
        );
        let errors = build(&referenced).unwrap_err();
        assert_eq!(errors.len(), 1, "{:#?}", errors);
    }
}
