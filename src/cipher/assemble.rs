//! Assembly of a minimal, self-contained cipher program from a full script

use crate::cipher::extract::extract_block;
use crate::cipher::locator::{CipherLocator, SplitJoinLocator};
use crate::error::SigfetchError;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Short identifiers that look like calls but are statements
const RESERVED: &[&str] = &["do", "for", "if", "in", "let", "new", "try", "var"];

/// Evaluable program: the dispatcher plus every helper it references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledProgram {
    /// Identifier of the script the program was cut from
    pub script_id: String,
    /// Dispatcher binding name
    pub dispatcher: String,
    /// Full program text
    pub code: String,
    /// When the program was assembled
    pub created: DateTime<Utc>,
}

impl AssembledProgram {
    /// Create a program stamped with the current time
    pub fn new(
        script_id: impl Into<String>,
        dispatcher: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            script_id: script_id.into(),
            dispatcher: dispatcher.into(),
            code: code.into(),
            created: Utc::now(),
        }
    }

    /// Valid only for the same script and within the freshness window
    pub fn is_valid_for(&self, script_id: &str, now: DateTime<Utc>, freshness: Duration) -> bool {
        self.script_id == script_id && now.signed_duration_since(self.created) <= freshness
    }
}

/// Builds [`AssembledProgram`]s out of fetched script text
#[derive(Clone)]
pub struct ProgramAssembler {
    locator: Arc<dyn CipherLocator>,
    member_calls: Regex,
    bare_calls: Regex,
}

impl ProgramAssembler {
    /// Create an assembler with the default locator
    pub fn new() -> Self {
        Self::with_locator(Arc::new(SplitJoinLocator::new()))
    }

    /// Create an assembler with a custom locator
    pub fn with_locator(locator: Arc<dyn CipherLocator>) -> Self {
        Self {
            locator,
            member_calls: Regex::new(
                r#"[{;=,(\s]([a-zA-Z$][a-zA-Z0-9$]{0,2})\.([a-zA-Z$][a-zA-Z0-9$]{0,2})\("#,
            )
            .expect("static regex"),
            bare_calls: Regex::new(r#"[{;=,(\s]([a-zA-Z$_][a-zA-Z0-9$]{0,2})\("#)
                .expect("static regex"),
        }
    }

    /// Assemble the cipher program contained in `script`.
    ///
    /// Fails if the dispatcher or any helper it references cannot be located;
    /// nothing partial is returned.
    pub fn assemble(&self, script_id: &str, script: &str) -> Result<AssembledProgram, SigfetchError> {
        let site = self
            .locator
            .dispatcher(script)
            .ok_or(SigfetchError::DispatcherNotFound)?;

        let mut dispatcher_text = site.header();
        dispatcher_text.push_str(&extract_block(script, site.body_start)?);
        let mut code = dispatcher_text.clone();

        // Helper tables: `Xy.ab(...)`
        for captures in self.member_calls.captures_iter(&dispatcher_text) {
            let name = &captures[1];
            if name == site.param {
                continue;
            }
            let declaration = format!("var {}={{", name);
            if code.contains(&declaration) {
                continue;
            }
            let helper = self
                .locator
                .helper_table(script, name)
                .ok_or_else(|| SigfetchError::HelperNotFound(declaration.clone()))?;
            code.push_str(&helper.declaration);
            code.push_str(&extract_block(script, helper.body_start)?);
            debug!("Appended helper table {}", name);
        }

        // Standalone helpers: `Xy(...)`
        for captures in self.bare_calls.captures_iter(&dispatcher_text) {
            let name = &captures[1];
            if name == site.name || name == site.param || RESERVED.contains(&name) {
                continue;
            }
            let prefix = format!("function {}(", name);
            if code.contains(&prefix) {
                continue;
            }
            let helper = self
                .locator
                .helper_function(script, name)
                .ok_or_else(|| SigfetchError::HelperNotFound(prefix.clone()))?;
            code.push_str(&helper.declaration);
            code.push_str(&extract_block(script, helper.body_start)?);
            debug!("Appended helper function {}", name);
        }

        debug!(
            "Assembled cipher program {} ({} chars) from {}",
            site.name,
            code.len(),
            script_id
        );
        Ok(AssembledProgram::new(script_id, site.name, code))
    }
}

impl Default for ProgramAssembler {
    fn default() -> Self {
        Self::new()
    }
}
