//! `{{placeholder}}` substitution for account defaults.

use crate::error::{SyncError, SyncResult};
use std::collections::BTreeMap;

/// Substitution passes before a template is declared non-convergent.
pub const MAX_TEMPLATE_PASSES: usize = 10;

/// Values available to templates, keyed by placeholder name.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: BTreeMap<&'static str, String>,
}

impl TemplateContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a placeholder; `None` leaves it unbound.
    pub fn bind(mut self, key: &'static str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.values.insert(key, value.to_string());
        }
        self
    }

    /// Resolves the first present candidate.
    ///
    /// Substitution is repeated until the text stops changing. A value that is
    /// still changing after [`MAX_TEMPLATE_PASSES`] passes is a configuration
    /// error.
    pub fn resolve(&self, candidates: &[Option<&str>]) -> SyncResult<Option<String>> {
        let Some(first) = candidates.iter().flatten().next() else {
            return Ok(None);
        };

        let mut text = first.to_string();
        let mut passes = 0;
        let mut changed = true;
        while changed && passes < MAX_TEMPLATE_PASSES {
            passes += 1;
            let previous = text.clone();
            for (key, value) in &self.values {
                text = text.replace(&format!("{{{{{key}}}}}"), value);
            }
            changed = previous != text;
        }

        if changed {
            return Err(SyncError::Configuration(format!(
                "too many levels of templatery in {first:?}"
            )));
        }
        Ok(Some(text))
    }
}
