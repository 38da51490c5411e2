//! Named defaults, launch-time overrides and `$name` substitution.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::{LoadError, Location};

/// A single `<default>` declaration and its current value.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default_value: String,
    pub value: String,
    pub overridden: bool,
    pub location: Location,
}

/// Holds the document's defaults and any external overrides.
#[derive(Clone, Debug, Default)]
pub struct ParameterTable {
    params: Vec<Parameter>,
    index: HashMap<String, usize>,
}

fn is_param_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Check that `name` can be written as `$name` inside an attribute.
pub fn is_valid_param_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_param_char)
}

/// First `$name` token in `text`, if any.
fn find_token(text: &str) -> Option<&str> {
    let mut rest = text;
    while let Some(dollar) = rest.find('$') {
        let after = &rest[dollar + 1..];
        let len = after
            .find(|c: char| !is_param_char(c))
            .unwrap_or(after.len());
        if len > 0 {
            return Some(&after[..len]);
        }
        rest = after;
    }
    None
}

/// Values are inserted verbatim, so one that still holds a token would
/// leave it unresolved in the output.
fn check_value(name: &str, value: &str) -> Result<(), LoadError> {
    match find_token(value) {
        Some(token) => Err(LoadError::NestedParameter {
            name: name.to_string(),
            token: token.to_string(),
        }),
        None => Ok(()),
    }
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a default exactly once.
    pub fn define(
        &mut self,
        name: &str,
        value: &str,
        location: Location,
    ) -> Result<(), LoadError> {
        if !is_valid_param_name(name) {
            return Err(LoadError::Parse {
                location,
                message: format!("invalid default name '{}'", name),
            });
        }
        if let Some(&i) = self.index.get(name) {
            return Err(LoadError::DuplicateDefault {
                name: name.to_string(),
                first: self.params[i].location,
                second: location,
            });
        }
        check_value(name, value)?;
        self.index.insert(name.to_string(), self.params.len());
        self.params.push(Parameter {
            name: name.to_string(),
            default_value: value.to_string(),
            value: value.to_string(),
            overridden: false,
            location,
        });
        Ok(())
    }

    /// Replace a default's value. The name must have been defined.
    pub fn override_value(&mut self, name: &str, value: &str) -> Result<(), LoadError> {
        let i = match self.index.get(name) {
            Some(&i) => i,
            None => {
                return Err(LoadError::UnknownParameter {
                    name: name.to_string(),
                })
            }
        };
        let param = &mut self.params[i];
        if param.overridden {
            return Err(LoadError::DuplicateOverride {
                name: name.to_string(),
            });
        }
        check_value(name, value)?;
        log::debug!(
            "Parameter '{}' overridden: {} -> {}",
            name,
            param.default_value,
            value
        );
        param.value = value.to_string();
        param.overridden = true;
        Ok(())
    }

    /// Current value of a parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.index.get(name).map(|&i| self.params[i].value.as_str())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameters in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    /// Replace every `$name` token in `raw` with the parameter's value.
    ///
    /// Substituted text is not scanned again. A `$` that is not followed by
    /// a name character is kept literally.
    pub fn resolve<'s>(&self, raw: &'s str, location: Location) -> Result<Cow<'s, str>, LoadError> {
        if !raw.contains('$') {
            return Ok(Cow::Borrowed(raw));
        }

        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(dollar) = rest.find('$') {
            out.push_str(&rest[..dollar]);
            let after = &rest[dollar + 1..];
            let name_len = after
                .find(|c: char| !is_param_char(c))
                .unwrap_or(after.len());
            if name_len == 0 {
                out.push('$');
                rest = after;
                continue;
            }
            let name = &after[..name_len];
            match self.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    return Err(LoadError::UndefinedParameter {
                        name: name.to_string(),
                        location,
                    })
                }
            }
            rest = &after[name_len..];
        }
        out.push_str(rest);
        Ok(Cow::Owned(out))
    }
}
