//! Structural locators for the dispatcher and its helpers inside script text
//!
//! Matching rules against obfuscated script text change whenever the script
//! changes shape, so they live behind [`CipherLocator`] and the assembler only
//! consumes located spans.

use regex::Regex;
use tracing::debug;

/// How the dispatcher binding was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationStyle {
    /// `var X=function(a){...}`
    Variable,
    /// `function X(a){...}`
    Function,
}

/// Located dispatcher entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSite {
    /// Short binding name
    pub name: String,
    /// Name of its single string parameter
    pub param: String,
    /// Declaration style found in the script
    pub style: DeclarationStyle,
    /// Offset just past the body's opening brace
    pub body_start: usize,
}

impl DispatcherSite {
    /// Normalized declaration header, ending with the opening brace
    pub fn header(&self) -> String {
        match self.style {
            DeclarationStyle::Variable => format!("var {}=function({}){{", self.name, self.param),
            DeclarationStyle::Function => format!("function {}({}){{", self.name, self.param),
        }
    }
}

/// Located helper declaration (lookup table or standalone function)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperSite {
    /// Declaration text preceding the body, ending with the opening brace
    pub declaration: String,
    /// Offset just past the body's opening brace
    pub body_start: usize,
}

/// Strategy for locating cipher code inside a script
pub trait CipherLocator: Send + Sync {
    /// Find the dispatcher entry point
    fn dispatcher(&self, script: &str) -> Option<DispatcherSite>;

    /// Find `var name={...}`
    fn helper_table(&self, script: &str, name: &str) -> Option<HelperSite>;

    /// Find `function name(...){...}`
    fn helper_function(&self, script: &str, name: &str) -> Option<HelperSite>;
}

/// Default locator: the dispatcher is the short binding whose body starts by
/// splitting its argument into characters.
pub struct SplitJoinLocator {
    assignment: Regex,
    declaration: Regex,
}

impl SplitJoinLocator {
    /// Create the locator with its built-in patterns
    pub fn new() -> Self {
        Self {
            assignment: Regex::new(
                r#"(?:\b|[^a-zA-Z0-9$])([a-zA-Z0-9$]{1,4})\s*=\s*function\(\s*([a-zA-Z0-9$]{1,3})\s*\)\s*\{\s*([a-zA-Z0-9$]{1,3})\s*=\s*([a-zA-Z0-9$]{1,3})\.split\(\s*""\s*\)"#,
            )
            .expect("static regex"),
            declaration: Regex::new(
                r#"function\s+([a-zA-Z0-9$]{1,4})\s*\(\s*([a-zA-Z0-9$]{1,3})\s*\)\s*\{\s*([a-zA-Z0-9$]{1,3})\s*=\s*([a-zA-Z0-9$]{1,3})\.split\(\s*""\s*\)"#,
            )
            .expect("static regex"),
        }
    }

    fn find_in(regex: &Regex, script: &str, style: DeclarationStyle) -> Option<DispatcherSite> {
        regex.captures_iter(script).find_map(|captures| {
            let name = captures.get(1)?;
            let param = captures.get(2)?.as_str();
            // `a=a.split("")` on the function's own parameter
            if captures.get(3)?.as_str() != param || captures.get(4)?.as_str() != param {
                return None;
            }
            let whole = captures.get(0)?;
            let brace = whole.start() + script[whole.start()..whole.end()].find('{')?;
            Some(DispatcherSite {
                name: name.as_str().to_string(),
                param: param.to_string(),
                style,
                body_start: brace + 1,
            })
        })
    }
}

impl Default for SplitJoinLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl CipherLocator for SplitJoinLocator {
    fn dispatcher(&self, script: &str) -> Option<DispatcherSite> {
        let site = Self::find_in(&self.assignment, script, DeclarationStyle::Variable)
            .or_else(|| Self::find_in(&self.declaration, script, DeclarationStyle::Function));
        if let Some(site) = &site {
            debug!("Dispatcher {} located ({:?})", site.name, site.style);
        }
        site
    }

    fn helper_table(&self, script: &str, name: &str) -> Option<HelperSite> {
        let declaration = format!("var {}={{", name);
        script.find(&declaration).map(|index| HelperSite {
            body_start: index + declaration.len(),
            declaration,
        })
    }

    fn helper_function(&self, script: &str, name: &str) -> Option<HelperSite> {
        let prefix = format!("function {}(", name);
        let index = script.find(&prefix)?;
        let brace = index + script[index..].find('{')?;
        Some(HelperSite {
            declaration: script[index..=brace].to_string(),
            body_start: brace + 1,
        })
    }
}
