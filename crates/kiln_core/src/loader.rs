//! Scene loading entry points.
//!
//! A load walks a fixed sequence of stages. Syntax and parameter errors stop
//! the load at the stage that found them; errors found while parsing and
//! instantiating nodes are collected so one load reports as many problems as
//! possible. Validation only runs on an error-free instantiation.

use std::fmt;
use std::path::Path;

use crate::builder::SceneBuilder;
use crate::document::{parse_defaults, parse_nodes, parse_root};
use crate::error::{LoadError, LoadErrors, LoadResult};
use crate::plugins::Instantiator;
use crate::scene::Scene;
use crate::xml::parse_document;

/// Options that control a single load.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// Values replacing `<default>` declarations, applied in order
    pub overrides: Vec<(String, String)>,

    /// Report unused properties as errors instead of warnings
    pub strict_properties: bool,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.push((name.into(), value.into()));
        self
    }

    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.overrides
            .extend(overrides.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_properties = strict;
        self
    }
}

/// Stages of a load, in the order they are entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadStage {
    Init,
    ParsingDefaults,
    ParsingNodes,
    Resolving,
    Validating,
    Ready,
    Failed,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStage::Init => "init",
            LoadStage::ParsingDefaults => "parsing defaults",
            LoadStage::ParsingNodes => "parsing nodes",
            LoadStage::Resolving => "resolving",
            LoadStage::Validating => "validating",
            LoadStage::Ready => "ready",
            LoadStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Drives one document through the load stages.
///
/// A loader runs once; it ends in either `Ready` or `Failed`.
#[derive(Debug)]
pub struct SceneLoader<'o> {
    options: &'o LoadOptions,
    stage: LoadStage,
    errors: Vec<LoadError>,
}

impl<'o> SceneLoader<'o> {
    pub fn new(options: &'o LoadOptions) -> Self {
        Self {
            options,
            stage: LoadStage::Init,
            errors: Vec::new(),
        }
    }

    pub fn stage(&self) -> LoadStage {
        self.stage
    }

    fn advance(&mut self, next: LoadStage) {
        debug_assert!(next > self.stage, "load stages only move forward");
        log::debug!("Load stage: {} -> {}", self.stage, next);
        self.stage = next;
    }

    fn fail(&mut self, mut errors: Vec<LoadError>) -> LoadErrors {
        log::debug!(
            "Load failed during {} with {} error(s)",
            self.stage,
            errors.len()
        );
        self.stage = LoadStage::Failed;
        errors.append(&mut self.errors);
        match LoadErrors::new(errors) {
            Some(errors) => errors,
            None => LoadErrors::single(LoadError::SceneValidation {
                message: "load failed without reporting an error".to_string(),
            }),
        }
    }

    /// Stop if any error has been collected so far.
    fn checkpoint(&mut self) -> LoadResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.fail(Vec::new()))
        }
    }

    /// Parse, resolve and validate `source`.
    pub fn load(&mut self, source: &str) -> LoadResult<Scene> {
        if self.stage != LoadStage::Init {
            return Err(LoadErrors::single(LoadError::SceneValidation {
                message: format!("loader already ran (stage: {})", self.stage),
            }));
        }

        self.advance(LoadStage::ParsingDefaults);
        let root = parse_document(source).map_err(|e| self.fail(vec![e.into()]))?;
        let version = parse_root(&root).map_err(|e| self.fail(vec![e]))?;
        log::debug!("Scene version {}", version);

        let mut params = parse_defaults(&root, &mut self.errors);
        for (name, value) in &self.options.overrides {
            if let Err(e) = params.override_value(name, value) {
                self.errors.push(e);
            }
        }
        self.checkpoint()?;

        self.advance(LoadStage::ParsingNodes);
        let nodes = parse_nodes(&root, &params, &mut self.errors);
        log::debug!("Parsed {} top-level nodes", nodes.len());

        self.advance(LoadStage::Resolving);
        let instantiation =
            Instantiator::new(&mut self.errors, self.options.strict_properties).run(&nodes);
        self.checkpoint()?;

        self.advance(LoadStage::Validating);
        let scene = SceneBuilder::new(version, &params)
            .build(instantiation)
            .map_err(|errors| self.fail(errors))?;

        self.advance(LoadStage::Ready);
        log::info!(
            "Loaded scene: {} sensors, {} shapes, {} bsdfs, {} emitters",
            scene.sensors.len(),
            scene.shapes.len(),
            scene.bsdfs.len(),
            scene.emitters.len()
        );
        Ok(scene)
    }
}

/// Load a scene from a string.
pub fn load_scene_from_str(source: &str, options: &LoadOptions) -> LoadResult<Scene> {
    SceneLoader::new(options).load(source)
}

/// Load a scene from a file.
pub fn load_scene<P: AsRef<Path>>(path: P, options: &LoadOptions) -> LoadResult<Scene> {
    let path = path.as_ref();
    log::info!("Loading scene: {}", path.display());
    let source = std::fs::read_to_string(path).map_err(|e| {
        LoadErrors::single(LoadError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    })?;
    load_scene_from_str(&source, options)
}
