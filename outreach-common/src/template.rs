//! Email template rendering.
//!
//! Templates use `{variable}` placeholders. A template is compiled once per
//! campaign into literal/variable segments; per-contact work is substitution
//! only. Missing variables render as the empty string so one contact's quirky
//! data cannot break the whole campaign — a failing render is attributed to
//! that contact alone by the dispatcher.

use ahash::AHashMap;
use thiserror::Error;

use crate::contact::Contact;

/// A fully rendered email for one contact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Template compilation or rendering failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("unterminated placeholder starting at byte {0}")]
    UnterminatedPlaceholder(usize),

    #[error("render failed: {0}")]
    Failed(String),
}

/// Produces subject/HTML/text content for one contact's context.
///
/// The dispatcher only depends on this trait, so a rendering failure is
/// recorded against the single contact whose context triggered it.
pub trait TemplateRenderer: Send + Sync {
    /// Render the campaign template against one contact's context.
    ///
    /// # Errors
    /// Returns [`RenderError`] when the template cannot be rendered for this
    /// context.
    fn render(&self, context: &AHashMap<String, String>) -> Result<RenderedEmail, RenderError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A template parsed once per campaign.
#[derive(Clone, Debug)]
pub struct CompiledTemplate {
    subject: Vec<Segment>,
    html: Vec<Segment>,
    text: Vec<Segment>,
}

impl CompiledTemplate {
    /// Parse subject and body templates.
    ///
    /// # Errors
    /// Returns [`RenderError::UnterminatedPlaceholder`] when a `{` has no
    /// matching `}`.
    pub fn compile(subject: &str, html: &str, text: &str) -> Result<Self, RenderError> {
        Ok(Self {
            subject: parse(subject)?,
            html: parse(html)?,
            text: parse(text)?,
        })
    }
}

impl TemplateRenderer for CompiledTemplate {
    fn render(&self, context: &AHashMap<String, String>) -> Result<RenderedEmail, RenderError> {
        Ok(RenderedEmail {
            subject: substitute(&self.subject, context),
            html: substitute(&self.html, context),
            text: substitute(&self.text, context),
        })
    }
}

fn parse(template: &str) -> Result<Vec<Segment>, RenderError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;
    let mut offset = 0;

    while let Some(brace) = rest.find(['{', '}']) {
        literal.push_str(&rest[..brace]);
        let after = &rest[brace + 1..];

        // "}}" collapses to a literal "}" so the escape syntax is symmetric
        // with "{{"; a lone "}" has no placeholder meaning and stays as-is.
        if rest[brace..].starts_with('}') {
            literal.push('}');
            if let Some(stripped) = after.strip_prefix('}') {
                offset += brace + 2;
                rest = stripped;
            } else {
                offset += brace + 1;
                rest = after;
            }
            continue;
        }

        // "{{" is an escaped literal brace.
        if let Some(stripped) = after.strip_prefix('{') {
            literal.push('{');
            offset += brace + 2;
            rest = stripped;
            continue;
        }

        let close = after
            .find('}')
            .ok_or(RenderError::UnterminatedPlaceholder(offset + brace))?;
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Variable(after[..close].trim().to_string()));
        offset += brace + close + 2;
        rest = &after[close + 1..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn substitute(segments: &[Segment], context: &AHashMap<String, String>) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            // Unknown variables degrade to the empty string.
            Segment::Variable(name) => {
                if let Some(value) = context.get(name) {
                    out.push_str(value);
                }
            }
        }
    }
    out
}

/// Build the per-contact substitution context: every pass-through source
/// field, the derived contact fields, and system-derived values.
#[must_use]
pub fn contact_context(contact: &Contact) -> AHashMap<String, String> {
    let mut context = contact.fields.clone();
    context.insert("email".to_string(), contact.email.to_string());
    context.insert("first_name".to_string(), contact.first_name.clone());
    context.insert("name".to_string(), contact.first_name.clone());
    if let Some(display_name) = &contact.display_name {
        context.insert("display_name".to_string(), display_name.clone());
    }
    context.insert(
        "date".to_string(),
        chrono::Utc::now().format("%Y-%m-%d").to_string(),
    );
    context
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::address::Address;

    fn context(pairs: &[(&str, &str)]) -> AHashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_variables() {
        let template = CompiledTemplate::compile(
            "Hello {name}",
            "<p>Hi {name}, from {sender}</p>",
            "Hi {name}",
        )
        .unwrap();

        let rendered = template
            .render(&context(&[("name", "Alice"), ("sender", "Ops")]))
            .unwrap();
        assert_eq!(rendered.subject, "Hello Alice");
        assert_eq!(rendered.html, "<p>Hi Alice, from Ops</p>");
        assert_eq!(rendered.text, "Hi Alice");
    }

    #[test]
    fn test_render_missing_variable_is_empty() {
        let template = CompiledTemplate::compile("To {name}", "{missing}!", "").unwrap();
        let rendered = template.render(&context(&[])).unwrap();
        assert_eq!(rendered.subject, "To ");
        assert_eq!(rendered.html, "!");
    }

    #[test]
    fn test_compile_unterminated_placeholder() {
        assert!(matches!(
            CompiledTemplate::compile("broken {name", "", ""),
            Err(RenderError::UnterminatedPlaceholder(7))
        ));
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        let template = CompiledTemplate::compile("{{literal}} {name}", "", "").unwrap();
        let rendered = template.render(&context(&[("name", "x")])).unwrap();
        assert_eq!(rendered.subject, "{literal} x");
    }

    #[test]
    fn test_doubled_closing_brace_collapses() {
        let template = CompiledTemplate::compile("a}}b", "lone } stays", "{name}}}").unwrap();
        let rendered = template.render(&context(&[("name", "x")])).unwrap();
        assert_eq!(rendered.subject, "a}b");
        assert_eq!(rendered.html, "lone } stays");
        assert_eq!(rendered.text, "x}");
    }

    #[test]
    fn test_contact_context_contains_derived_fields() {
        let contact = Contact::new(
            Address::parse("jane@example.com").unwrap(),
            Some("Dr. Jane Smith".to_string()),
            "Friend",
            context(&[("Company", "Example Inc")]),
        );

        let ctx = contact_context(&contact);
        assert_eq!(ctx.get("email").map(String::as_str), Some("jane@example.com"));
        assert_eq!(ctx.get("first_name").map(String::as_str), Some("Jane"));
        assert_eq!(ctx.get("name").map(String::as_str), Some("Jane"));
        assert_eq!(ctx.get("Company").map(String::as_str), Some("Example Inc"));
        assert!(ctx.contains_key("date"));
    }
}
