//! Command templates with `{param}` placeholders.
//!
//! A placeholder is written `{name}` and must be bound when the template is
//! rendered. `{name?}` marks an optional placeholder: when the parameter is
//! unbound the whole argument (or environment variable) containing it is
//! dropped, so `--options={options?}` disappears instead of rendering as
//! `--options=`. Literal braces are written `{{` and `}}`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use steward_core::Params;

use crate::error::PlanError;

/// A program invocation with argument and environment templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    /// Program path or name looked up on `PATH`.
    pub program: String,
    /// Argument templates, one per argv entry.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables, values are templates too.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl CommandTemplate {
    /// Start a template for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Append one argument template.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several argument templates.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable template.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Names of every placeholder used by the program, arguments and
    /// environment, in first-use order.
    pub fn placeholders(&self) -> Result<Vec<String>, PlanError> {
        let mut names = Vec::new();
        for text in std::iter::once(&self.program)
            .chain(&self.args)
            .chain(self.env.values())
        {
            for segment in parse(text)? {
                if let Segment::Placeholder { name, .. } = segment
                    && !names.contains(&name)
                {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Substitute `params` into the template.
    pub fn render(&self, params: &Params) -> Result<RenderedCommand, PlanError> {
        let program = render_str(&self.program, params)?
            .ok_or_else(|| PlanError::MalformedTemplate(self.program.clone()))?;

        let mut args = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            if let Some(rendered) = render_str(arg, params)? {
                args.push(rendered);
            }
        }

        let mut env = BTreeMap::new();
        for (key, value) in &self.env {
            if let Some(rendered) = render_str(value, params)? {
                env.insert(key.clone(), rendered);
            }
        }

        Ok(RenderedCommand { program, args, env })
    }
}

/// A fully rendered command, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedCommand {
    /// Program path or name.
    pub program: String,
    /// Concrete argv (without the program).
    pub args: Vec<String>,
    /// Extra environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl fmt::Display for RenderedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={value} ")?;
        }
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder { name: String, optional: bool },
}

fn parse(template: &str) -> Result<Vec<Segment>, PlanError> {
    let malformed = || PlanError::MalformedTemplate(template.to_owned());
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(malformed()),
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '?' => {
                            name.push(c);
                        }
                        _ => return Err(malformed()),
                    }
                }
                let (name, optional) = match name.strip_suffix('?') {
                    Some(stripped) => (stripped.to_owned(), true),
                    None => (name, false),
                };
                if name.is_empty() || name.contains('?') {
                    return Err(malformed());
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder { name, optional });
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Render one template string.
///
/// Returns `Ok(None)` when an optional placeholder is unbound.
pub(crate) fn render_str(template: &str, params: &Params) -> Result<Option<String>, PlanError> {
    let mut out = String::with_capacity(template.len());
    for segment in parse(template)? {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Placeholder { name, optional } => match params.render(&name) {
                Some(value) => out.push_str(&value),
                None if optional => return Ok(None),
                None => {
                    return Err(PlanError::UnboundPlaceholder {
                        name,
                        template: template.to_owned(),
                    });
                }
            },
        }
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn drain() -> CommandTemplate {
        CommandTemplate::new("kubectl")
            .args(["drain", "{node}", "--ignore-daemonsets"])
            .arg("--timeout={timeout?}")
    }

    #[test]
    fn renders_required_placeholders() {
        let rendered = drain()
            .render(&Params::new().with("node", "worker-1").with("timeout", "300s"))
            .unwrap();
        assert_eq!(rendered.program, "kubectl");
        assert_eq!(
            rendered.args,
            vec!["drain", "worker-1", "--ignore-daemonsets", "--timeout=300s"]
        );
    }

    #[test]
    fn drops_argument_with_unbound_optional() {
        let rendered = drain().render(&Params::new().with("node", "n")).unwrap();
        assert_eq!(rendered.args, vec!["drain", "n", "--ignore-daemonsets"]);
    }

    #[test]
    fn unbound_required_placeholder_is_an_error() {
        let err = drain().render(&Params::new()).unwrap_err();
        assert_eq!(
            err,
            PlanError::UnboundPlaceholder {
                name: "node".into(),
                template: "{node}".into()
            }
        );
    }

    #[test]
    fn escaped_braces_render_literally() {
        let template = CommandTemplate::new("kubectl")
            .arg("-o=jsonpath={{.spec.unschedulable}}")
            .arg("{{{node}}}");
        let rendered = template.render(&Params::new().with("node", "a")).unwrap();
        assert_eq!(rendered.args, vec!["-o=jsonpath={.spec.unschedulable}", "{a}"]);
    }

    #[test]
    fn malformed_templates_are_rejected() {
        for bad in ["{node", "node}", "{}", "{a b}", "{?}", "{a?b}"] {
            let err = CommandTemplate::new("x").arg(bad).render(&Params::new());
            assert_eq!(err.unwrap_err(), PlanError::MalformedTemplate(bad.into()), "{bad}");
        }
    }

    #[test]
    fn lists_render_comma_joined_and_env_is_templated() {
        let template = CommandTemplate::new("etcdctl")
            .arg("--endpoints={endpoints}")
            .env("ETCDCTL_API", "3")
            .env("EXTRA", "{extra?}");
        let rendered = template
            .render(&Params::new().with("endpoints", json!(["https://a:2379", "https://b:2379"])))
            .unwrap();
        assert_eq!(rendered.args, vec!["--endpoints=https://a:2379,https://b:2379"]);
        assert_eq!(rendered.env.len(), 1);
        assert_eq!(rendered.env.get("ETCDCTL_API").map(String::as_str), Some("3"));
    }

    #[test]
    fn placeholders_are_listed_once_in_order() {
        let template = CommandTemplate::new("mount")
            .args(["{device}", "{path}", "--options={options?}", "{path}"]);
        assert_eq!(template.placeholders().unwrap(), vec!["device", "path", "options"]);
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let rendered = RenderedCommand {
            program: "systemctl".into(),
            args: vec!["restart".into(), "my unit".into()],
            env: BTreeMap::new(),
        };
        assert_eq!(rendered.to_string(), "systemctl restart 'my unit'");
    }
}
