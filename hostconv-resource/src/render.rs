//! Value rendering for declared configuration.
//!
//! Preparers pass every templated string through a [`Renderer`] before
//! building a task. Rendering is pure: it reads the evaluation context and
//! never touches the system.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("{field}: unknown parameter '{param}'")]
    UnknownParam { field: String, param: String },

    #[error("{field}: unsupported expression '{expr}'")]
    Unsupported { field: String, expr: String },

    #[error("{field}: unterminated placeholder")]
    Unterminated { field: String },
}

/// Resolves templated configuration values.
pub trait Renderer: Send + Sync {
    /// Render `template` for the configuration field `field`.
    fn render(&self, field: &str, template: &str) -> Result<String, RenderError>;
}

/// Renderer that substitutes `{{param "name"}}` placeholders from a fixed
/// parameter map.
#[derive(Debug, Clone, Default)]
pub struct ParamRenderer {
    params: BTreeMap<String, String>,
}

impl ParamRenderer {
    pub fn new(params: BTreeMap<String, String>) -> Self {
        Self { params }
    }

    fn eval(&self, field: &str, expr: &str) -> Result<String, RenderError> {
        let unsupported = || RenderError::Unsupported {
            field: field.to_string(),
            expr: expr.to_string(),
        };

        let name = expr
            .strip_prefix("param")
            .map(str::trim)
            .and_then(|rest| rest.strip_prefix('"'))
            .and_then(|rest| rest.strip_suffix('"'))
            .ok_or_else(unsupported)?;

        self.params
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::UnknownParam {
                field: field.to_string(),
                param: name.to_string(),
            })
    }
}

impl Renderer for ParamRenderer {
    fn render(&self, field: &str, template: &str) -> Result<String, RenderError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| RenderError::Unterminated {
                field: field.to_string(),
            })?;
            out.push_str(&self.eval(field, after[..end].trim())?);
            rest = &after[end + 2..];
        }
        out.push_str(rest);

        Ok(out)
    }
}
