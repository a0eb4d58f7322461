use scraper::{ElementRef, Selector};
use serde::Deserialize;

use crate::error::{AppError, Result};

/// What to read from each matched node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// All descendant text.
    Text,
    /// First non-empty direct child text node.
    OwnText,
    Attr(String),
}

/// A compiled CSS locator. Used for containers that are iterated rather than read.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct NodeQuery {
    css: String,
    selector: Selector,
}

impl NodeQuery {
    pub fn parse(css: &str) -> Result<Self> {
        let selector = Selector::parse(css)
            .map_err(|e| AppError::Selector(format!("{css}: {e}")))?;
        Ok(Self { css: css.to_string(), selector })
    }

    pub fn css(&self) -> &str {
        &self.css
    }

    pub fn select<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        scope.select(&self.selector).collect()
    }

    pub fn first<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        scope.select(&self.selector).next()
    }

    pub fn exists(&self, scope: ElementRef<'_>) -> bool {
        self.first(scope).is_some()
    }
}

impl TryFrom<String> for NodeQuery {
    type Error = AppError;

    fn try_from(css: String) -> Result<Self> {
        NodeQuery::parse(&css)
    }
}

/// Declarative field location: a selector plus addressing options.
///
/// Evaluation collects one trimmed, non-empty value per matched node, then
/// applies the first option present: `index`, slice bounds (optionally
/// joined), `join`, and finally the default position `pos`.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "FieldSpec")]
pub struct FieldQuery {
    node: NodeQuery,
    source: ValueSource,
    index: Option<usize>,
    slice_from: Option<usize>,
    slice_to: Option<usize>,
    join: Option<String>,
    pos: usize,
    required: bool,
}

impl FieldQuery {
    pub fn text(css: &str) -> Result<Self> {
        Ok(Self {
            node: NodeQuery::parse(css)?,
            source: ValueSource::Text,
            index: None,
            slice_from: None,
            slice_to: None,
            join: None,
            pos: 0,
            required: false,
        })
    }

    pub fn attr(css: &str, name: &str) -> Result<Self> {
        Ok(Self { source: ValueSource::Attr(name.to_string()), ..Self::text(css)? })
    }

    pub fn own_text(mut self) -> Self {
        self.source = ValueSource::OwnText;
        self
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn slice(mut self, from: Option<usize>, to: Option<usize>) -> Self {
        self.slice_from = from;
        self.slice_to = to;
        self
    }

    pub fn joined(mut self, sep: &str) -> Self {
        self.join = Some(sep.to_string());
        self
    }

    pub fn pos(mut self, pos: usize) -> Self {
        self.pos = pos;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn css(&self) -> &str {
        self.node.css()
    }

    /// Every trimmed, non-empty value in document order.
    pub fn values(&self, scope: ElementRef<'_>) -> Vec<String> {
        self.node
            .select(scope)
            .into_iter()
            .filter_map(|el| read_value(el, &self.source))
            .collect()
    }

    /// Addressed value, `None` when nothing matched.
    pub fn get(&self, scope: ElementRef<'_>) -> Option<String> {
        let values = self.values(scope);
        if values.is_empty() {
            return None;
        }

        if let Some(index) = self.index {
            return values.into_iter().nth(index);
        }

        let sliced = if self.slice_from.is_some() || self.slice_to.is_some() {
            let from = self.slice_from.unwrap_or(0).min(values.len());
            let to = self.slice_to.unwrap_or(values.len()).clamp(from, values.len());
            values[from..to].to_vec()
        } else {
            values
        };

        match &self.join {
            Some(sep) => Some(sliced.join(sep)),
            None => sliced.into_iter().nth(self.pos),
        }
    }

    /// Like [`FieldQuery::get`], but a required field that resolves to nothing is an error.
    pub fn extract(&self, scope: ElementRef<'_>) -> Result<Option<String>> {
        match self.get(scope) {
            None if self.required => Err(AppError::NotFound(format!(
                "required field missing: {}",
                self.node.css()
            ))),
            other => Ok(other),
        }
    }
}

fn read_value(el: ElementRef<'_>, source: &ValueSource) -> Option<String> {
    let raw = match source {
        ValueSource::Text => el.text().collect::<String>(),
        ValueSource::OwnText => el
            .children()
            .filter_map(|child| child.value().as_text())
            .map(|t| t.trim())
            .find(|t| !t.is_empty())?
            .to_string(),
        ValueSource::Attr(name) => el.value().attr(name)?.to_string(),
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ---------------------------------------------------------------------------
// Catalog representation
// ---------------------------------------------------------------------------

/// `"div.x"` shorthand or the full object form.
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldSpec {
    Css(String),
    Full {
        css: String,
        #[serde(default)]
        attr: Option<String>,
        #[serde(default)]
        own_text: bool,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        slice: Option<(Option<usize>, Option<usize>)>,
        #[serde(default)]
        join: Option<String>,
        #[serde(default)]
        pos: usize,
        #[serde(default)]
        required: bool,
    },
}

impl TryFrom<FieldSpec> for FieldQuery {
    type Error = AppError;

    fn try_from(spec: FieldSpec) -> Result<Self> {
        match spec {
            FieldSpec::Css(css) => FieldQuery::text(&css),
            FieldSpec::Full { css, attr, own_text, index, slice, join, pos, required } => {
                let mut q = match attr {
                    Some(name) => FieldQuery::attr(&css, &name)?,
                    None => FieldQuery::text(&css)?,
                };
                if own_text {
                    q = q.own_text();
                }
                if let Some((from, to)) = slice {
                    q = q.slice(from, to);
                }
                q.index = index;
                q.join = join;
                q.pos = pos;
                q.required = required;
                Ok(q)
            }
        }
    }
}
