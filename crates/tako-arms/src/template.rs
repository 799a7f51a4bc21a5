//! Argument templating for `exec` stages.
//!
//! Handlebars in strict mode with HTML escaping off, plus path helpers:
//! - stem: file name without extension
//! - basename: file name
//! - dirname: parent directory

use crate::error::ArmError;
use handlebars::{
    no_escape, Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext,
    RenderErrorReason, Template,
};
use serde_json::Value;
use std::path::Path;

pub struct ArgRenderer {
    handlebars: Handlebars<'static>,
}

impl ArgRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(no_escape);

        handlebars.register_helper("stem", Box::new(PathPart("stem", stem)));
        handlebars.register_helper("basename", Box::new(PathPart("basename", basename)));
        handlebars.register_helper("dirname", Box::new(PathPart("dirname", dirname)));

        ArgRenderer { handlebars }
    }

    pub fn render(&self, template: &str, data: &Value) -> Result<String, ArmError> {
        self.handlebars
            .render_template(template, data)
            .map_err(|e| ArmError::Template(format!("'{}': {}", template, e)))
    }

    /// Syntax check without data
    pub fn check(template: &str) -> Result<(), ArmError> {
        Template::compile(template)
            .map(|_| ())
            .map_err(|e| ArmError::Template(format!("'{}': {}", template, e)))
    }
}

impl Default for ArgRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

fn basename(path: &Path) -> Option<String> {
    path.file_name().map(|s| s.to_string_lossy().into_owned())
}

fn dirname(path: &Path) -> Option<String> {
    path.parent().map(|p| p.to_string_lossy().into_owned())
}

/// `{{stem input}}`-style helper applying a path function to its argument
struct PathPart(&'static str, fn(&Path) -> Option<String>);

impl HelperDef for PathPart {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = h
            .param(0)
            .and_then(|v| v.value().as_str())
            .ok_or(RenderErrorReason::ParamNotFoundForIndex(self.0, 0))?;

        if let Some(part) = (self.1)(Path::new(value)) {
            out.write(&part)?;
        }
        Ok(())
    }
}
